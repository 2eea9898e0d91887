//! Integration tests for Modex

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    const MARKER: &str = "DEBUG: @//extension.toml%ext: I was called!";

    const MODULE: &str = r#"
[module]
name = "root"
version = "1.0.0"

[[use_extension]]
extension = "extension.toml%ext"
use_repo = ["hello"]

[[use_extension]]
extension = "extension.toml%other"
use_repo = ["world"]

[[local_path_override]]
module_name = "bazel_tools"
path = "tools_mock"
"#;

    const EXTENSION: &str = r#"
[ext]
print = ["I was called!"]

[[ext.repo]]
name = "hello"
rule = "file"
attrs = { files = { "BUILD" = "filegroup(name='lala')", "WORKSPACE" = "" } }

[other]
print = ["other was called"]

[[other.repo]]
name = "world"
rule = "file"
attrs = { files = { "BUILD" = "" } }
"#;

    /// A workspace with its own (absent) config file
    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::write(dir.path().join("MODULE.toml"), MODULE).unwrap();
            std::fs::write(dir.path().join("extension.toml"), EXTENSION).unwrap();
            std::fs::create_dir_all(dir.path().join("tools_mock")).unwrap();
            Self { dir }
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }

        fn lockfile(&self) -> Vec<u8> {
            std::fs::read(self.root().join("MODULE.lock")).unwrap()
        }

        fn modex(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("modex");
            cmd.env("MODEX_CONFIG", self.root().join("config.toml"))
                .arg("--workspace")
                .arg(self.root());
            cmd
        }
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("modex")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("module extension"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("modex")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("modex"));
    }

    #[test]
    fn config_path() {
        let f = Fixture::new();
        f.modex()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let f = Fixture::new();
        f.modex()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("[fetch]"));
    }

    #[test]
    fn config_init_writes_file() {
        let f = Fixture::new();
        f.modex().args(["config", "init"]).assert().success();
        assert!(f.root().join("config.toml").exists());
    }

    #[test]
    fn completions_generate() {
        cargo_bin_cmd!("modex")
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("modex"));
    }

    #[test]
    fn missing_module_file() {
        let dir = TempDir::new().unwrap();
        cargo_bin_cmd!("modex")
            .env("MODEX_CONFIG", dir.path().join("config.toml"))
            .arg("--workspace")
            .arg(dir.path())
            .args(["fetch"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Module file not found"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn fetch_then_build_without_fetching() {
        let f = Fixture::new();

        f.modex()
            .args(["fetch", "--all"])
            .assert()
            .success()
            .stderr(predicate::str::contains(MARKER));
        let first = f.lockfile();
        assert!(f.root().join(".modex/external/hello/BUILD").exists());

        f.modex()
            .args(["build", "--fetch=false", "@hello"])
            .assert()
            .success()
            .stdout(predicate::str::contains("@hello"))
            .stdout(predicate::str::contains("external"))
            .stderr(predicate::str::contains("I was called!").not());

        f.modex()
            .args(["fetch", "--all"])
            .assert()
            .success()
            .stderr(predicate::str::contains("I was called!").not());
        assert_eq!(f.lockfile(), first);
    }

    #[test]
    fn build_without_fetching_needs_cached_result() {
        let f = Fixture::new();
        f.modex()
            .args(["build", "--fetch=false", "@hello//:all"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Fetching is disabled"))
            .stderr(predicate::str::contains("Hint:"))
            .stderr(predicate::str::contains("I was called!").not());
        assert!(!f.root().join("MODULE.lock").exists());
    }

    #[test]
    fn build_fetches_only_what_targets_need() {
        let f = Fixture::new();
        f.modex()
            .args(["build", "@hello//pkg:bin"])
            .assert()
            .success()
            .stderr(predicate::str::contains(MARKER))
            .stderr(predicate::str::contains("other was called").not());
    }

    #[test]
    fn fetch_single_repository() {
        let f = Fixture::new();
        f.modex()
            .args(["fetch", "--repo", "world"])
            .assert()
            .success()
            .stderr(predicate::str::contains("other was called"))
            .stderr(predicate::str::contains("I was called!").not());
    }

    #[test]
    fn unknown_repository_fails() {
        let f = Fixture::new();
        f.modex()
            .args(["build", "@nope"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("@nope"));
    }

    #[test]
    fn editing_extension_reevaluates() {
        let f = Fixture::new();
        f.modex().args(["fetch"]).assert().success();

        let edited = EXTENSION.replace("filegroup(name='lala')", "filegroup(name='lulu')");
        std::fs::write(f.root().join("extension.toml"), edited).unwrap();

        f.modex()
            .args(["fetch"])
            .assert()
            .success()
            .stderr(predicate::str::contains(MARKER))
            .stderr(predicate::str::contains("other was called").not());
        let build = std::fs::read_to_string(f.root().join(".modex/external/hello/BUILD")).unwrap();
        assert!(build.contains("lulu"));
    }

    #[test]
    fn force_reevaluates_fresh_extensions() {
        let f = Fixture::new();
        f.modex().args(["fetch"]).assert().success();
        f.modex()
            .args(["fetch", "--force"])
            .assert()
            .success()
            .stderr(predicate::str::contains(MARKER));
    }

    #[test]
    fn strict_lockfile_mode_rejects_stale_entries() {
        let f = Fixture::new();
        f.modex()
            .args(["fetch", "--lockfile-mode", "error"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("inconsistent"))
            .stderr(predicate::str::contains("I was called!").not());
        assert!(!f.root().join("MODULE.lock").exists());
    }

    #[test]
    fn lockfile_mode_off_never_writes() {
        let f = Fixture::new();
        f.modex()
            .args(["fetch", "--lockfile-mode", "off"])
            .assert()
            .success()
            .stderr(predicate::str::contains(MARKER));
        assert!(!f.root().join("MODULE.lock").exists());
    }

    #[test]
    fn repository_override_serves_local_directory() {
        let f = Fixture::new();
        let local = f.root().join("local_hello");
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(local.join("BUILD"), "# local").unwrap();

        f.modex()
            .args(["build", "@hello", "--override-repository"])
            .arg(format!("hello={}", local.display()))
            .assert()
            .success();
        let build = std::fs::read_to_string(f.root().join(".modex/external/hello/BUILD")).unwrap();
        assert_eq!(build, "# local");
    }

    #[test]
    fn unrequested_entry_keeps_its_repository_names() {
        let f = Fixture::new();
        let extension = format!(
            "{}\n[twin]\n[[twin.repo]]\nname = \"hello\"\nrule = \"file\"\n\n[[twin.repo]]\nname = \"mine\"\nrule = \"file\"\nattrs = {{ files = {{ \"BUILD\" = \"\" }} }}\n",
            EXTENSION
        );
        std::fs::write(f.root().join("extension.toml"), extension).unwrap();
        let module = format!(
            "{}\n[[use_extension]]\nextension = \"extension.toml%twin\"\nuse_repo = [\"mine\"]\n",
            MODULE
        );
        std::fs::write(f.root().join("MODULE.toml"), module).unwrap();

        f.modex().args(["build", "@hello"]).assert().success();
        f.modex().args(["build", "@mine"]).assert().failure();
        f.modex().args(["fetch", "--all"]).assert().failure();

        let lockfile: serde_json::Value = serde_json::from_slice(&f.lockfile()).unwrap();
        let entries = lockfile["moduleExtensions"].as_object().unwrap();
        let holders: Vec<_> = entries
            .iter()
            .filter(|(_, entry)| entry["generatedRepoSpecs"].get("hello").is_some())
            .map(|(id, _)| id.as_str())
            .collect();
        assert_eq!(holders, ["@//extension.toml%ext"]);
        assert!(!f.root().join(".modex/external/mine").exists());
    }

    #[test]
    fn lock_verify_reports_staleness() {
        let f = Fixture::new();
        f.modex()
            .args(["lock", "verify"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("no lockfile entry"))
            .stderr(predicate::str::contains("stale"));

        f.modex().args(["fetch"]).assert().success();

        f.modex()
            .args(["lock", "verify"])
            .assert()
            .success()
            .stdout(predicate::str::contains("up to date"))
            .stderr(predicate::str::contains("I was called!").not());
    }

    #[test]
    fn lock_show_lists_entries() {
        let f = Fixture::new();
        f.modex().args(["fetch"]).assert().success();

        f.modex()
            .args(["lock", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("@//extension.toml%ext"))
            .stdout(predicate::str::contains("@hello"));

        f.modex()
            .args(["lock", "show", "--json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"lockFileVersion\": 1"));
    }
}
