#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use conc::{driver::Driver, manager::Manager, protocol::Dispatcher};
use tempfile::tempdir;

use common::{adopt_child_signal_dispositions, wait_until};

const DEMO_UPSERT: &str = r#"PROJECT-UPSERT
{"name":"demo","cwd":"/tmp","services":[{"name":"svc","command":["/bin/sleep","60"]}]}"#;

fn dispatcher_at(root: &std::path::Path) -> Dispatcher {
    let manager = Manager::new(Driver::new(root));
    manager.init().unwrap();
    Dispatcher::new(Arc::new(manager))
}

/// Splits a response into its status line and payload lines.
fn parse_response(response: &str) -> (String, Vec<String>) {
    let mut lines = response.lines().map(str::to_string);
    let status = lines.next().unwrap_or_default();
    (status, lines.collect())
}

#[test]
fn upsert_then_info_reports_an_idle_service() {
    adopt_child_signal_dispositions();
    let temp = tempdir().unwrap();
    let d = dispatcher_at(temp.path());

    let (status, payload) = parse_response(&d.dispatch(DEMO_UPSERT));
    assert_eq!(status, "OK");
    assert_eq!(payload, vec!["svc IDLE 0 -".to_string()]);
}

#[test]
fn start_reports_running_with_pid_and_log_path() {
    adopt_child_signal_dispositions();
    let temp = tempdir().unwrap();
    let d = dispatcher_at(temp.path());
    d.dispatch(DEMO_UPSERT);

    let (status, payload) = parse_response(&d.dispatch("SERVICE-START\ndemo\nsvc"));
    assert_eq!(status, "OK");
    assert_eq!(payload.len(), 1);

    let fields: Vec<&str> = payload[0].split(' ').collect();
    assert_eq!(fields[0], "svc");
    assert_eq!(fields[1], "RUNNING");
    let pid: u32 = fields[2].parse().unwrap();
    assert!(pid > 0);
    let log_path = fields[3];
    assert!(log_path.starts_with('/'), "log path is absolute: {log_path}");
    assert!(log_path.ends_with("/demo/svc/log"));

    // A follow-up info query returns the same line.
    let (_, info_payload) = parse_response(&d.dispatch("SERVICE-INFO\ndemo\nsvc"));
    assert_eq!(info_payload, payload);

    d.dispatch("SERVICE-STOP\ndemo\nsvc");
}

#[test]
fn stop_reports_stopped_and_stays_ok_when_repeated() {
    adopt_child_signal_dispositions();
    let temp = tempdir().unwrap();
    let d = dispatcher_at(temp.path());
    d.dispatch(DEMO_UPSERT);
    d.dispatch("SERVICE-START\ndemo\nsvc");

    let (status, payload) = parse_response(&d.dispatch("SERVICE-STOP\ndemo\nsvc"));
    assert_eq!(status, "OK");
    let fields: Vec<&str> = payload[0].split(' ').collect();
    assert_eq!(fields[1], "STOPPED");
    assert!(fields[2].parse::<u32>().unwrap() > 0, "pid stays visible");
    assert!(fields[3].starts_with('/'));

    // No-action stop is still OK and still STOPPED.
    let (status, payload) = parse_response(&d.dispatch("SERVICE-STOP\ndemo\nsvc"));
    assert_eq!(status, "OK");
    assert!(payload[0].contains(" STOPPED "));
}

#[test]
fn unknown_project_is_an_error() {
    adopt_child_signal_dispositions();
    let temp = tempdir().unwrap();
    let d = dispatcher_at(temp.path());
    assert_eq!(d.dispatch("PROJECT-INFO\nmissing"), "ERROR\nproject_not_found");
    assert_eq!(
        d.dispatch("SERVICE-INFO\nmissing\nsvc"),
        "ERROR\nproject_not_found"
    );
}

#[test]
fn missing_argument_is_an_arity_error() {
    adopt_child_signal_dispositions();
    let temp = tempdir().unwrap();
    let d = dispatcher_at(temp.path());
    d.dispatch(DEMO_UPSERT);
    assert_eq!(
        d.dispatch("SERVICE-START\ndemo"),
        "ERROR\ninvalid_argument_count"
    );
}

#[test]
fn unknown_service_is_an_error() {
    adopt_child_signal_dispositions();
    let temp = tempdir().unwrap();
    let d = dispatcher_at(temp.path());
    d.dispatch(DEMO_UPSERT);
    assert_eq!(
        d.dispatch("SERVICE-START\ndemo\nmissing"),
        "ERROR\nservice_not_found"
    );
}

#[test]
fn project_listings_follow_store_order() {
    adopt_child_signal_dispositions();
    let temp = tempdir().unwrap();
    let d = dispatcher_at(temp.path());
    d.dispatch(DEMO_UPSERT);
    d.dispatch(
        r#"PROJECT-UPSERT
{"name":"other","cwd":"/tmp","services":[{"name":"one","command":["/bin/true"]},{"name":"two","command":["/bin/true"]}]}"#,
    );

    let (status, names) = parse_response(&d.dispatch("PROJECTS-NAMES"));
    assert_eq!(status, "OK");
    assert_eq!(names, vec!["other".to_string(), "demo".to_string()]);

    let (_, services) = parse_response(&d.dispatch("SERVICES-NAMES\nother"));
    assert_eq!(services, vec!["one".to_string(), "two".to_string()]);

    // PROJECTS-INFO interleaves a project name line with its services.
    let (_, info) = parse_response(&d.dispatch("PROJECTS-INFO"));
    assert_eq!(info[0], "other");
    assert!(info[1].starts_with("one "));
    assert!(info[2].starts_with("two "));
    assert_eq!(info[3], "demo");
    assert!(info[4].starts_with("svc "));
}

#[test]
fn settings_round_trip_over_the_protocol() {
    adopt_child_signal_dispositions();
    let temp = tempdir().unwrap();
    let d = dispatcher_at(temp.path());
    d.dispatch(DEMO_UPSERT);

    let (status, payload) = parse_response(&d.dispatch("PROJECT-SETTINGS\ndemo"));
    assert_eq!(status, "OK");

    let reparsed: serde_json::Value = serde_json::from_str(&payload.join("\n")).unwrap();
    assert_eq!(reparsed["name"], "demo");
    assert_eq!(reparsed["cwd"], "/tmp");
    assert_eq!(reparsed["services"][0]["command"][0], "/bin/sleep");

    let (_, listing) = parse_response(&d.dispatch("PROJECTS-SETTINGS"));
    assert!(listing[0].starts_with("demo {"));
}

#[test]
fn remove_returns_bare_ok_and_forgets_the_project() {
    adopt_child_signal_dispositions();
    let temp = tempdir().unwrap();
    let d = dispatcher_at(temp.path());
    d.dispatch(DEMO_UPSERT);

    assert_eq!(d.dispatch("PROJECT-REMOVE\ndemo"), "OK");
    assert_eq!(d.dispatch("PROJECT-INFO\ndemo"), "ERROR\nproject_not_found");
}

#[test]
fn project_start_and_stop_echo_project_info() {
    adopt_child_signal_dispositions();
    let temp = tempdir().unwrap();
    let d = dispatcher_at(temp.path());
    d.dispatch(DEMO_UPSERT);

    let (status, payload) = parse_response(&d.dispatch("PROJECT-START\ndemo"));
    assert_eq!(status, "OK");
    assert!(payload[0].contains(" RUNNING "));

    let (status, payload) = parse_response(&d.dispatch("PROJECT-STOP\ndemo"));
    assert_eq!(status, "OK");
    assert!(payload[0].contains(" STOPPED "));
}

#[test]
fn restart_verbs_replace_the_child() {
    adopt_child_signal_dispositions();
    let temp = tempdir().unwrap();
    let d = dispatcher_at(temp.path());
    d.dispatch(DEMO_UPSERT);

    let (_, first) = parse_response(&d.dispatch("SERVICE-START\ndemo\nsvc"));
    let first_pid: u32 = first[0].split(' ').nth(2).unwrap().parse().unwrap();

    let (status, second) = parse_response(&d.dispatch("SERVICE-RESTART\ndemo\nsvc"));
    assert_eq!(status, "OK");
    let second_pid: u32 = second[0].split(' ').nth(2).unwrap().parse().unwrap();
    assert_ne!(first_pid, second_pid);

    d.dispatch("PROJECT-STOP\ndemo");
}

#[test]
fn clear_logs_truncates_service_logs() {
    adopt_child_signal_dispositions();
    let temp = tempdir().unwrap();
    let d = dispatcher_at(temp.path());
    d.dispatch(
        r#"PROJECT-UPSERT
{"name":"noisy","cwd":"/tmp","services":[{"name":"svc","command":["/bin/sh","-c","echo noise"]}]}"#,
    );
    d.dispatch("SERVICE-START\nnoisy\nsvc");

    let log_path = temp.path().join("noisy/svc/log");
    wait_until("child output in the log", || {
        std::fs::read_to_string(&log_path).is_ok_and(|content| !content.is_empty())
    });

    let (status, _) = parse_response(&d.dispatch("SERVICE-CLEAR-LOGS\nnoisy\nsvc"));
    assert_eq!(status, "OK");
    assert_eq!(std::fs::read_to_string(&log_path).unwrap(), "");
}
