//! End-to-end builds against the fake toolchain.

use gaia_lib::workspace::{LOCK_FILENAME, Workspace, WorkspaceError};
use gaia_lib::{BuildError, BuildSpec, ErrorKind, Platform, PluginReference, ReplaceDirective};
use tokio_util::sync::CancellationToken;

use super::common::{BASE_VERSION, FakeGo};

fn position(calls: &[String], prefix: &str) -> usize {
  calls
    .iter()
    .position(|call| call.starts_with(prefix))
    .unwrap_or_else(|| panic!("no call starting with '{}' in {:?}", prefix, calls))
}

#[tokio::test]
async fn builds_with_plugins_in_stage_order() {
  let fake = FakeGo::new();
  let output = fake.path("out/revad");
  std::fs::create_dir_all(output.parent().unwrap()).unwrap();

  let spec = BuildSpec::new(&output)
    .with_entries(["example.org/plugin-a@v1.0.0", "example.org/plugin-b"])
    .unwrap();

  let built = fake.builder().build(&spec, CancellationToken::new()).await.unwrap();

  assert_eq!(built, output);
  assert!(output.is_file());

  let calls = fake.calls();
  let init = position(&calls, "mod init revad");
  let get_a = position(&calls, "get example.org/plugin-a@v1.0.0");
  let get_b = position(&calls, "get example.org/plugin-b");
  let get_base = position(&calls, "get github.com/cs3org/reva@latest");
  let tidy = position(&calls, "mod tidy");
  let list = position(&calls, "list -m -json github.com/cs3org/reva");
  let build = position(&calls, "build -o");
  assert!(init < get_a && get_a < get_b && get_b < get_base);
  assert!(get_base < tidy && tidy < list && list < build);
  assert!(!calls.iter().any(|call| call.starts_with("mod edit -replace")));

  let entry = std::fs::read_to_string(format!("{}.main.go", output.display())).unwrap();
  assert!(entry.contains("basecmd \"github.com/cs3org/reva/cmd/revad\""));
  let plugin_a = entry.find("_ \"example.org/plugin-a\"").unwrap();
  let plugin_b = entry.find("_ \"example.org/plugin-b\"").unwrap();
  assert!(plugin_a < plugin_b);
}

#[tokio::test]
async fn release_build_embeds_metadata() {
  let fake = FakeGo::new();
  let output = fake.path("revad");
  let mut spec = BuildSpec::new(&output);
  spec.tags = vec!["ceph".to_string(), "eos".to_string()];

  fake.builder().build(&spec, CancellationToken::new()).await.unwrap();

  let calls = fake.calls();
  let build = &calls[position(&calls, "build -o")];
  assert!(build.starts_with(&format!("build -o {} -trimpath -ldflags -w -s", output.display())));
  assert!(build.contains("-X 'github.com/cs3org/reva/cmd/revad.gitCommit=4bbe83eec'"));
  assert!(build.contains(&format!("-X 'github.com/cs3org/reva/cmd/revad.version={}'", BASE_VERSION)));
  assert!(build.contains("-X 'github.com/cs3org/reva/cmd/revad.goVersion=1.22.4'"));
  assert!(build.contains("revad.buildDate="));
  assert!(build.contains("-tags ceph,eos"));
  assert!(build.ends_with("main.go"));
  assert!(!build.contains("-gcflags"));
}

#[tokio::test]
async fn debug_build_keeps_symbols() {
  let fake = FakeGo::new();
  let mut spec = BuildSpec::new(fake.path("revad"));
  spec.debug = true;

  fake.builder().build(&spec, CancellationToken::new()).await.unwrap();

  let calls = fake.calls();
  let build = &calls[position(&calls, "build -o")];
  assert!(build.contains("-gcflags all=-N -l"));
  assert!(!build.contains("-trimpath"));
  assert!(!build.contains("-w -s"));
}

#[tokio::test]
async fn platform_and_cache_env_reach_the_toolchain() {
  let fake = FakeGo::new();
  let mut spec = BuildSpec::new(fake.path("revad"));
  spec.platform = Platform {
    os: Some("darwin".to_string()),
    arch: None,
  };

  fake.builder().build(&spec, CancellationToken::new()).await.unwrap();

  let lines = fake.log_lines();
  let tidy = lines.iter().find(|line| line.starts_with("mod tidy")).unwrap();
  assert!(tidy.contains("GOOS=darwin"), "{}", tidy);
  assert!(tidy.contains("GOARCH=amd64"), "{}", tidy);
  assert!(tidy.contains("GOPATH=/tmp/fake-gopath"), "{}", tidy);
}

#[tokio::test]
async fn local_override_inherits_its_replaces() {
  let fake = FakeGo::new();
  let checkout = fake.path("reva");
  std::fs::create_dir_all(&checkout).unwrap();
  std::fs::write(
    checkout.join("gomod.json"),
    r#"{"Module": {"Path": "github.com/cs3org/reva"}, "Replace": [
      {"Old": {"Path": "D1"}, "New": {"Path": "example.org/d1", "Version": "v1.0.0"}},
      {"Old": {"Path": "D2"}, "New": {"Path": "example.org/d2"}}
    ]}"#,
  )
  .unwrap();

  let mut spec = BuildSpec::new(fake.path("revad"));
  spec.plugins.push(PluginReference::new("example.org/plugin"));
  spec
    .replacements
    .push(ReplaceDirective::new("github.com/cs3org/reva", checkout.to_string_lossy()));

  fake.builder().build(&spec, CancellationToken::new()).await.unwrap();

  let calls = fake.calls();
  let edit = &calls[position(&calls, "mod edit -replace")];
  assert_eq!(
    edit,
    &format!(
      "mod edit -replace=github.com/cs3org/reva={} -replace=D1=example.org/d1@v1.0.0 -replace=D2=example.org/d2",
      checkout.display()
    )
  );
  assert!(position(&calls, "get github.com/cs3org/reva@latest") < position(&calls, "mod edit -replace"));
  assert!(position(&calls, "mod edit -replace") < position(&calls, "mod tidy"));

  // Version and commit come from the checkout, not from the module list.
  assert!(!calls.iter().any(|call| call.starts_with("list -m")));
  let build = &calls[position(&calls, "build -o")];
  assert!(build.contains("revad.version=v1.28.0-3-g4bbe83e'"));
  assert!(build.contains("revad.gitCommit=4bbe83e'"));
}

#[tokio::test]
async fn empty_output_creates_no_workspace() {
  let fake = FakeGo::new();
  let workspace = fake.path("ws");
  let mut spec = BuildSpec::new("");
  spec.workspace_dir = Some(workspace.clone());

  let err = fake.builder().build(&spec, CancellationToken::new()).await.unwrap_err();

  assert_eq!(err.kind(), ErrorKind::Configuration);
  assert!(!workspace.exists());
  assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn invalid_coordinate_is_a_configuration_error() {
  let fake = FakeGo::new();
  let mut spec = BuildSpec::new(fake.path("revad"));
  spec.plugins.push(PluginReference::new("example.org/\"evil\""));

  let err = fake.builder().build(&spec, CancellationToken::new()).await.unwrap_err();

  assert_eq!(err.kind(), ErrorKind::Configuration);
  assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn toolchain_failure_names_the_stage_and_cleans_up() {
  let fake = FakeGo::new();
  let workspace = fake.path("ws");
  let mut spec = BuildSpec::new(fake.path("revad"));
  spec.workspace_dir = Some(workspace.clone());
  // The fake cannot write into a missing directory.
  spec.output = fake.path("missing/dir/revad");

  let err = fake.builder().build(&spec, CancellationToken::new()).await.unwrap_err();

  match &err {
    BuildError::Toolchain { stage, .. } => assert_eq!(stage.to_string(), "compile"),
    other => panic!("unexpected error: {other}"),
  }
  assert_eq!(err.kind(), ErrorKind::Toolchain);
  assert!(!workspace.exists());
  assert!(!fake.path("missing/dir/revad").exists());
}

#[tokio::test]
async fn retained_workspace_keeps_entry_file() {
  let fake = FakeGo::new();
  let workspace = fake.path("ws");
  let mut spec = BuildSpec::new(fake.path("revad"));
  spec.workspace_dir = Some(workspace.clone());
  spec.leave_workspace = true;

  fake.builder().build(&spec, CancellationToken::new()).await.unwrap();

  assert!(workspace.join("main.go").is_file());
  assert!(workspace.join("go.mod").is_file());
  // The claim is released once the build is over.
  assert!(workspace.join(LOCK_FILENAME).exists());
  Workspace::create(Some(&workspace), true).unwrap();
}

#[tokio::test]
async fn claimed_workspace_is_rejected() {
  let fake = FakeGo::new();
  let workspace = fake.path("ws");
  let _held = Workspace::create(Some(&workspace), true).unwrap();

  let mut spec = BuildSpec::new(fake.path("revad"));
  spec.workspace_dir = Some(workspace.clone());

  let err = fake.builder().build(&spec, CancellationToken::new()).await.unwrap_err();

  assert!(matches!(err, BuildError::Workspace(WorkspaceError::InUse { .. })));
  assert_eq!(err.kind(), ErrorKind::Io);
  assert!(fake.calls().is_empty());
}
