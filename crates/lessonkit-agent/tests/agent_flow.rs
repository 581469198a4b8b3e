//! Agent wired to a real HTTP loader against a mock origin.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use lessonkit_agent::{Agent, AgentConfig};
use lessonkit_common::LessonKitError;
use lessonkit_net::{LoaderConfig, ResourceLoader};
use lessonkit_reminders::{ManualClock, NotificationCenter, NotificationPermission};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> AgentConfig {
    AgentConfig {
        origin: format!("{}/", server.uri()),
        app_shell: vec!["/".to_string(), "/index.html".to_string()],
        ..Default::default()
    }
}

async fn start(config: AgentConfig) -> lessonkit_common::Result<(Agent, Arc<NotificationCenter>)> {
    let loader = ResourceLoader::new(LoaderConfig::default()).unwrap();
    let monday = NaiveDate::from_ymd_opt(2024, 9, 2)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    let center = Arc::new(NotificationCenter::new(NotificationPermission::Granted));
    let agent = Agent::start(
        config,
        Arc::new(loader),
        Arc::new(ManualClock::new(monday)),
        center.clone(),
    )
    .await?;
    Ok((agent, center))
}

async fn requests_to(server: &MockServer, wanted: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == wanted)
        .count()
}

#[tokio::test]
async fn serves_shell_from_cache_after_install() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    let (agent, _center) = start(config_for(&server)).await.unwrap();
    assert_eq!(requests_to(&server, "/index.html").await, 1);

    let line = format!("GET {}/index.html", server.uri());
    assert_eq!(agent.execute(&line).await.unwrap().as_deref(), Some("200 cache"));
    assert_eq!(requests_to(&server, "/index.html").await, 1);

    let line = format!("GET {}/api/schedule", server.uri());
    assert_eq!(agent.execute(&line).await.unwrap().as_deref(), Some("- passthrough"));

    let line = format!("GET {}/assets/app.js", server.uri());
    assert_eq!(agent.execute(&line).await.unwrap().as_deref(), Some("200 network"));

    agent.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_shell_asset_aborts_start() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.html"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    assert!(start(config_for(&server)).await.is_err());
}

#[tokio::test]
async fn control_messages_arm_reminders() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (agent, _center) = start(config_for(&server)).await.unwrap();
    let schedule = r#"{"type": "SCHEDULE_UPDATED", "payload": [
        {"id": "m1", "day": "monday", "startTime": "10:30", "endTime": "11:15",
         "subject": "Math", "group": "5B"}
    ]}"#;
    assert!(agent.execute(&schedule.replace('\n', " ")).await.unwrap().is_none());
    assert!(agent.execute("nonsense").await.is_err());

    let scheduler = agent.scheduler().clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while scheduler.armed_count().await == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("schedule applied");
    assert_eq!(scheduler.armed().await[0].entry_id, "m1");

    assert_eq!(agent.shutdown().await.unwrap(), 1);
    assert_eq!(scheduler.armed_count().await, 0);
}

#[tokio::test]
async fn unavailable_cache_storage_is_a_cache_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    let (agent, _center) = start(config_for(&server)).await.unwrap();
    agent.registration().caches().write().await.set_available(false);

    let url = format!("{}/index.html", server.uri());
    let err = agent.fetch(&url).await.unwrap_err();
    assert!(matches!(err, LessonKitError::Cache { .. }));

    agent.shutdown().await.unwrap();
}
