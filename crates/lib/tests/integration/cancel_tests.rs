//! Cancellation and deadlines.

use std::time::{Duration, Instant};

use gaia_lib::{BuildError, BuildSpec, BuildStage, BuilderConfig, ErrorKind};
use tokio_util::sync::CancellationToken;

use super::common::FakeGo;

#[tokio::test]
async fn cancel_mid_fetch_removes_workspace_and_skips_compile() {
  let fake = FakeGo::new();
  let workspace = fake.path("ws");
  let mut spec = BuildSpec::new(fake.path("revad"))
    .with_entries(["example.org/fast", "example.org/slow", "example.org/after"])
    .unwrap();
  spec.workspace_dir = Some(workspace.clone());

  let token = CancellationToken::new();
  let canceller = {
    let token = token.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(300)).await;
      token.cancel();
    })
  };

  let started = Instant::now();
  let err = fake.builder().build(&spec, token).await.unwrap_err();
  canceller.await.unwrap();

  assert!(matches!(err, BuildError::Cancelled(BuildStage::FetchPlugins)), "{err}");
  assert_eq!(err.kind(), ErrorKind::Cancelled);
  assert!(started.elapsed() < Duration::from_secs(10));
  assert!(!workspace.exists());

  let calls = fake.calls();
  assert!(calls.iter().any(|call| call == "get example.org/slow"));
  assert!(!calls.iter().any(|call| call == "get example.org/after"));
  assert!(!calls.iter().any(|call| call.starts_with("mod tidy")));
  assert!(!calls.iter().any(|call| call.starts_with("build")));
  assert!(!fake.path("revad").exists());
}

#[tokio::test]
async fn deadline_reports_timeout() {
  let fake = FakeGo::new();
  let config = BuilderConfig {
    build_timeout_ms: Some(1000),
    ..fake.config()
  };
  let spec = BuildSpec::new(fake.path("revad"))
    .with_entries(["example.org/slow"])
    .unwrap();

  let started = Instant::now();
  let err = fake
    .builder_with(config)
    .build(&spec, CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(err, BuildError::TimedOut(BuildStage::FetchPlugins)), "{err}");
  assert_eq!(err.kind(), ErrorKind::TimedOut);
  assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn concurrent_builds_use_separate_workspaces() {
  let fake = FakeGo::new();
  let builder = fake.builder();
  let first = BuildSpec::new(fake.path("first"));
  let second = BuildSpec::new(fake.path("second"));

  let (a, b) = tokio::join!(
    builder.build(&first, CancellationToken::new()),
    builder.build(&second, CancellationToken::new())
  );

  assert_eq!(a.unwrap(), fake.path("first"));
  assert_eq!(b.unwrap(), fake.path("second"));
  let inits = fake.calls().iter().filter(|call| call.starts_with("mod init")).count();
  assert_eq!(inits, 2);
}
