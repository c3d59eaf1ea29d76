// Command-line tests: spawn the kettle binary against an isolated prefix


use std::fs;
use std::process::Command;
use test_helpers::TestEnvironment;

#[test]
fn test_path_flags() {
    let env = TestEnvironment::new();
    let config = &env.config;

    assert_eq!(env.cmd(&["--prefix"]).trim(), config.prefix.display().to_string());
    assert_eq!(env.cmd(&["--cellar"]).trim(), config.cellar.display().to_string());
    assert_eq!(env.cmd(&["--cache"]).trim(), config.cache.display().to_string());
    assert!(env.cmd(&["--repository"]).contains(&config.repository.display().to_string()));
    assert!(env.cmd(&["--version"]).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_path_flags_with_formula() {
    let env = TestEnvironment::new();
    let testball = env.formula_outside_taps("testball", "0.1");
    let testball = testball.to_str().unwrap();
    let cellar = env.config.cellar.display().to_string();

    assert!(env.cmd(&["--prefix", testball]).contains(&format!("{}/testball/0.1", cellar)));
    assert!(env.cmd(&["--cellar", testball]).contains(&format!("{}/testball", cellar)));
    assert!(
        env.cmd(&["--cache", testball])
            .contains(&format!("{}/testball-", env.config.cache.display()))
    );
}

#[test]
fn test_env_prints_build_environment() {
    let env = TestEnvironment::new();
    let out = env.cmd(&["--env"]);
    let prefix = env.config.prefix.display().to_string();
    assert!(
        out.contains(&format!("CMAKE_PREFIX_PATH=\"{}\"", prefix))
            || out.contains(&format!("CMAKE_PREFIX_PATH=\"{}:", prefix)),
        "{}",
        out
    );
}

#[test]
fn test_install_and_uninstall_from_path() {
    let env = TestEnvironment::new();
    let testball = env.formula_outside_taps("testball", "0.1");
    let testball = testball.to_str().unwrap();

    let out = env.cmd(&["install", testball]);
    assert!(out.contains(&format!("{}/testball/0.1", env.config.cellar.display())));

    let out = env.cmd(&["uninstall", "--force", testball]);
    assert!(out.contains("Uninstalling testball"), "{}", out);
    assert!(!env.config.cellar.join("testball").exists());

    env.cmd(&["cleanup", "--force", "--prune=all"]);
    assert_eq!(fs::read_dir(&env.config.cache).unwrap().count(), 0);
}

#[test]
fn test_second_install_fails_until_forced() {
    let env = TestEnvironment::new();
    env.add_formula("testball", "0.1", &[]);
    env.cmd(&["install", "testball"]);

    let out = env.cmd_fail(&["install", "testball"]);
    assert!(out.contains("Error:"), "{}", out);
    assert!(out.contains("testball 0.1 is already installed"), "{}", out);
    assert!(out.contains("--force"), "{}", out);

    let out = env.cmd(&["install", "--force", "testball"]);
    assert!(out.contains(&format!("{}/testball/0.1", env.config.cellar.display())), "{}", out);
}

#[test]
fn test_bottle_requires_a_tap() {
    let env = TestEnvironment::new();
    let testball = env.formula_outside_taps("testball", "0.1");
    let testball = testball.to_str().unwrap();

    env.cmd(&["install", "--build-bottle", testball]);
    let out = env.cmd_fail(&["bottle", "--no-revision", testball]);
    assert!(out.contains("Formula not from core or any taps"), "{}", out);

    env.write_formula(
        "testball",
        serde_json::json!({ "url": "https://example.com/testball-0.1.tar.gz" }),
    );
    let out = env.cmd(&["bottle", "--no-revision", "testball"]);
    assert!(out.contains("testball-0.1."), "{}", out);
    assert!(out.contains(".bottle.tar.gz"), "{}", out);

    let written: Vec<_> = fs::read_dir(&env.fixtures)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n.ends_with(".bottle.tar.gz"))
        .collect();
    assert_eq!(written.len(), 1);
}

#[test]
fn test_cleanup_prints_pruned_cache_files() {
    let env = TestEnvironment::new();
    fs::write(env.config.cache.join("test"), "test").unwrap();

    let out = env.cmd(&["cleanup", "--prune=all"]);
    assert!(out.contains(&format!("{}/test", env.config.cache.display())), "{}", out);
    assert!(!env.config.cache.join("test").exists());
}

#[test]
fn test_cleanup_dry_run_keeps_files() {
    let env = TestEnvironment::new();
    fs::write(env.config.cache.join("test"), "test").unwrap();

    let out = env.cmd(&["cleanup", "-n", "--prune=all"]);
    assert!(out.contains("Would remove"), "{}", out);
    assert!(env.config.cache.join("test").exists());
}

#[test]
fn test_missing_after_forced_uninstall() {
    let env = TestEnvironment::new();
    env.add_formula("foo", "1.0", &[]);
    env.add_formula("bar", "1.0", &["foo"]);

    env.cmd(&["install", "bar"]);
    let out = env.cmd_fail(&["uninstall", "foo"]);
    assert!(out.contains("required by bar"), "{}", out);

    env.cmd(&["uninstall", "--force", "foo"]);
    assert_eq!(env.cmd(&["missing"]).trim(), "foo");

    env.cmd(&["uninstall", "--force", "foo", "bar"]);
    assert_eq!(env.cmd(&["missing"]).trim(), "");
}

#[test]
fn test_list_and_deps() {
    let env = TestEnvironment::new();
    env.add_formula("foo", "1.0", &[]);
    env.add_formula("bar", "1.0", &["foo"]);

    assert_eq!(env.cmd(&["deps", "bar"]).trim(), "foo");
    env.cmd(&["install", "bar"]);
    assert_eq!(env.cmd(&["list"]).trim(), "bar\nfoo");
    assert!(env.cmd(&["list", "--versions"]).contains("foo 1.0"));
}

#[test]
fn test_unknown_formula_fails() {
    let env = TestEnvironment::new();
    let out = env.cmd_fail(&["install", "nonexistent"]);
    assert!(out.contains("Error:"), "{}", out);
    assert!(out.contains("No available formula with the name \"nonexistent\""), "{}", out);
}

#[test]
fn test_readall() {
    let env = TestEnvironment::new();
    let formula = env.add_formula("foo", "1.0", &[]);
    let aliases = env.core_tap().join("Aliases");
    fs::create_dir_all(&aliases).unwrap();
    std::os::unix::fs::symlink(&formula, aliases.join("bar")).unwrap();

    env.cmd(&["readall", "--aliases", "--syntax"]);
    env.cmd(&["readall", "Homebrew/homebrew"]);

    fs::write(env.core_formula_dir().join("broken.json"), "{ not json").unwrap();
    let out = env.cmd_fail(&["readall", "--syntax"]);
    assert!(out.contains("broken"), "{}", out);
}

fn git(dir: &std::path::Path, args: &[&str]) -> bool {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "kettle")
        .env("GIT_AUTHOR_EMAIL", "kettle@example.com")
        .env("GIT_COMMITTER_NAME", "kettle")
        .env("GIT_COMMITTER_EMAIL", "kettle@example.com")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[test]
fn test_tap_commands() {
    let env = TestEnvironment::new();
    fs::remove_dir_all(env.core_tap()).unwrap();
    let path = env.config.taps_dir().join("homebrew/homebrew-foo");
    fs::create_dir_all(path.join("Formula")).unwrap();
    fs::write(
        path.join("Formula/hello.json"),
        r#"{ "url": "https://example.com/hello-1.0.tar.gz" }"#,
    )
    .unwrap();

    let has_git = git(&path, &["init", "--quiet"])
        && git(&path, &["remote", "add", "origin", "https://github.com/Homebrew/homebrew-foo"])
        && git(&path, &["add", "--all"])
        && git(&path, &["commit", "--quiet", "-m", "init"]);

    assert!(env.cmd(&["tap"]).contains("homebrew/foo"));
    assert!(env.cmd(&["tap", "--list-official"]).contains("homebrew/versions"));
    assert!(env.cmd(&["tap-info"]).contains("1 tap"));
    if has_git {
        let remote = "https://github.com/Homebrew/homebrew-foo";
        assert!(env.cmd(&["tap-info", "homebrew/foo"]).contains(remote));
        assert!(env.cmd(&["tap-info", "--json=v1", "--installed"]).contains(remote));
    }
    assert!(env.cmd(&["tap-pin", "homebrew/foo"]).contains("Pinned homebrew/foo"));
    assert!(env.cmd(&["tap", "--list-pinned"]).contains("homebrew/foo"));
    assert!(env.cmd(&["tap-unpin", "homebrew/foo"]).contains("Unpinned homebrew/foo"));

    if has_git {
        let source = path.join(".git");
        assert!(env.cmd(&["tap", "homebrew/bar", source.to_str().unwrap()]).contains("Tapped"));
        assert!(env.cmd(&["untap", "homebrew/bar"]).contains("Untapped"));
    }
}

#[test]
fn test_doctor_trailing_slashes() {
    let env = TestEnvironment::new();
    let path = format!("{}:/foo/bar/", std::env::var("PATH").unwrap_or_default());
    let output = env
        .command()
        .args(["doctor", "check_path_for_trailing_slashes"])
        .env("PATH", path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Some directories in your path end in a slash"));
}

#[test]
fn test_doctor_anaconda() {
    let env = TestEnvironment::new();
    let dir = env.temp_dir.path().join("conda-bin");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("anaconda"), "").unwrap();
    fs::write(dir.join("python"), "#!/bin/sh\n").unwrap();

    let path = format!("{}:{}", dir.display(), std::env::var("PATH").unwrap_or_default());
    let output = env
        .command()
        .args(["doctor", "check_for_anaconda"])
        .env("PATH", path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Anaconda"));
}

#[test]
fn test_doctor_unknown_check() {
    let env = TestEnvironment::new();
    let out = env.cmd_fail(&["doctor", "check_for_unicorns"]);
    assert!(out.contains("No check available by the name"), "{}", out);
}
