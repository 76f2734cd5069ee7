//! End-to-end discovery tests.
//!
//! Tests cover:
//! - Entrypoint detection through the full pipeline
//! - Endpoint declaration, resolution and allocation
//! - Sandbox wrapping and bypass
//! - The `discover-app` binary's stdout and exit code contract

use reverse_bin_discover::{
    DiscoverConfig, DiscoverError, LaunchDescriptor, ProcessEnv, SandboxSettings, discover,
};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;
use tempfile::{TempDir, tempdir};

// ============================================================================
// Helpers
// ============================================================================

fn write_file(dir: &Path, name: &str, contents: &str, mode: u32) {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
}

fn script_app() -> TempDir {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "main.py", "#!/usr/bin/env python3\n", 0o755);
    dir
}

fn typed_app() -> TempDir {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "main.ts", "export default {};\n", 0o644);
    dir
}

fn process_env() -> ProcessEnv {
    ProcessEnv {
        path: Some("/usr/bin:/bin".to_string()),
        reverse_proxy_to: None,
    }
}

fn unsandboxed() -> DiscoverConfig {
    DiscoverConfig {
        sandbox: SandboxSettings {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Value following `flag` in a wrapped executable.
fn flag_value<'a>(executable: &'a [String], flag: &str) -> Option<&'a str> {
    executable
        .iter()
        .position(|a| a == flag)
        .map(|i| executable[i + 1].as_str())
}

fn allocated_port(descriptor: &LaunchDescriptor) -> u16 {
    descriptor
        .reverse_proxy_to
        .strip_prefix("127.0.0.1:")
        .expect("allocated endpoint should be loopback TCP")
        .parse()
        .unwrap()
}

// ============================================================================
// Entrypoint Detection
// ============================================================================

mod entrypoints {
    use super::*;

    #[test]
    fn test_typed_runtime_uses_allocated_port() {
        let app = typed_app();
        let descriptor = discover(app.path(), &unsandboxed(), &process_env()).unwrap();
        let port = allocated_port(&descriptor);

        assert_eq!(descriptor.executable[0], "deno");
        assert_eq!(
            flag_value(&descriptor.executable, "--port"),
            Some(port.to_string().as_str())
        );
        assert_eq!(flag_value(&descriptor.executable, "--host"), Some("127.0.0.1"));
        assert_eq!(descriptor.executable.last().unwrap(), "main.ts");
    }

    #[test]
    fn test_typed_runtime_uses_declared_port() {
        let app = typed_app();
        write_file(app.path(), ".env", "REVERSE_PROXY_TO=:18080\n", 0o644);

        let descriptor = discover(app.path(), &unsandboxed(), &process_env()).unwrap();
        assert_eq!(descriptor.reverse_proxy_to, "127.0.0.1:18080");
        assert_eq!(flag_value(&descriptor.executable, "--port"), Some("18080"));
    }

    #[test]
    fn test_typed_runtime_declared_host_matches_bound_host() {
        let app = typed_app();
        write_file(app.path(), ".env", "REVERSE_PROXY_TO=localhost:18081\n", 0o644);

        let descriptor = discover(app.path(), &DiscoverConfig::default(), &process_env()).unwrap();
        assert_eq!(descriptor.reverse_proxy_to, "127.0.0.1:18081");
        assert_eq!(flag_value(&descriptor.executable, "--host"), Some("127.0.0.1"));
        assert_eq!(flag_value(&descriptor.executable, "--port"), Some("18081"));
        assert!(
            descriptor
                .envs
                .contains(&"REVERSE_PROXY_TO=127.0.0.1:18081".to_string())
        );
    }

    #[test]
    fn test_executable_script_runs_directly() {
        let app = script_app();
        let descriptor = discover(app.path(), &unsandboxed(), &process_env()).unwrap();
        assert_eq!(descriptor.executable, vec!["./main.py"]);
    }

    #[test]
    fn test_no_entrypoint_is_configuration_error() {
        let app = tempdir().unwrap();
        write_file(app.path(), "main.py", "print('hi')\n", 0o644);

        let err = discover(app.path(), &DiscoverConfig::default(), &process_env()).unwrap_err();
        assert!(matches!(err, DiscoverError::NoEntrypoint { .. }));
        assert!(err.is_configuration());
    }
}

// ============================================================================
// Endpoints
// ============================================================================

mod endpoints {
    use super::*;

    #[test]
    fn test_declared_unix_socket_is_resolved() {
        let app = script_app();
        write_file(app.path(), ".env", "REVERSE_PROXY_TO=unix/app.sock\n", 0o644);

        let descriptor = discover(app.path(), &DiscoverConfig::default(), &process_env()).unwrap();
        let expected = app.path().canonicalize().unwrap().join("app.sock");
        assert_eq!(
            descriptor.reverse_proxy_to,
            format!("unix/{}", expected.display())
        );
        // The child sees the directory-relative form
        assert!(
            descriptor
                .envs
                .contains(&"REVERSE_PROXY_TO=unix/app.sock".to_string())
        );
        // No port to bind for a socket
        assert_eq!(flag_value(&descriptor.executable, "--bind-tcp"), None);
    }

    #[test]
    fn test_declared_absolute_socket_fails() {
        let app = script_app();
        write_file(app.path(), ".env", "REVERSE_PROXY_TO=unix//tmp/app.sock\n", 0o644);

        let err = discover(app.path(), &DiscoverConfig::default(), &process_env()).unwrap_err();
        assert!(matches!(err, DiscoverError::AbsoluteUnixSocket(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_process_endpoint_used_when_file_is_silent() {
        let app = script_app();
        write_file(app.path(), ".env", "GREETING=hello\n", 0o644);
        let process = ProcessEnv {
            reverse_proxy_to: Some("127.0.0.1:19090".to_string()),
            ..process_env()
        };

        let descriptor = discover(app.path(), &unsandboxed(), &process).unwrap();
        assert_eq!(descriptor.reverse_proxy_to, "127.0.0.1:19090");
    }

    #[test]
    fn test_allocated_port_is_the_only_bind_grant() {
        let app = script_app();
        let descriptor = discover(app.path(), &DiscoverConfig::default(), &process_env()).unwrap();
        let port = allocated_port(&descriptor);

        assert_eq!(
            flag_value(&descriptor.executable, "--bind-tcp"),
            Some(port.to_string().as_str())
        );
        assert!(
            descriptor
                .envs
                .contains(&format!("REVERSE_PROXY_TO=127.0.0.1:{port}"))
        );
    }

    #[test]
    fn test_repeated_runs_differ_only_in_port() {
        let app = script_app();
        let config = DiscoverConfig::default();

        let runs: Vec<LaunchDescriptor> = (0..3)
            .map(|_| discover(app.path(), &config, &process_env()).unwrap())
            .collect();

        let shape = |d: &LaunchDescriptor| {
            let port = allocated_port(d).to_string();
            let loopback = format!("127.0.0.1:{port}");
            d.executable
                .iter()
                .map(|a| {
                    if *a == port {
                        "PORT".to_string()
                    } else {
                        a.replace(&loopback, "127.0.0.1:PORT")
                    }
                })
                .collect::<Vec<_>>()
        };

        for run in &runs[1..] {
            assert_eq!(shape(run), shape(&runs[0]));
            assert_eq!(run.working_directory, runs[0].working_directory);
        }

        let ports: Vec<u16> = runs.iter().map(allocated_port).collect();
        assert!(
            ports.iter().any(|p| *p != ports[0]),
            "expected fresh ports, got {ports:?}"
        );
    }
}

// ============================================================================
// Environment and Sandbox
// ============================================================================

mod sandboxing {
    use super::*;

    #[test]
    fn test_wrapped_executable_layout() {
        let app = script_app();
        std::fs::create_dir(app.path().join("data")).unwrap();
        write_file(app.path(), ".env", "# settings\nGREETING=hello\n", 0o644);

        let descriptor = discover(app.path(), &DiscoverConfig::default(), &process_env()).unwrap();
        let exe = &descriptor.executable;
        let app_dir = app.path().canonicalize().unwrap();
        let data_dir = app_dir.join("data");

        assert_eq!(exe[0], "landrun");
        assert_eq!(exe.last().unwrap(), "./main.py");
        assert!(exe.contains(&"--unrestricted-network".to_string()));
        assert!(exe.contains(&"GREETING=hello".to_string()));

        let rox = flag_value(exe, "--rox").unwrap();
        assert!(rox.split(',').next() == Some(app_dir.to_str().unwrap()));

        let rw = flag_value(exe, "--rw").unwrap();
        assert!(rw.split(',').any(|p| p == data_dir.to_str().unwrap()));

        assert_eq!(
            descriptor.envs.last().unwrap(),
            &format!("HOME={}", data_dir.display())
        );
    }

    #[test]
    fn test_bypass_returns_raw_command() {
        let app = script_app();
        let wrapped = discover(app.path(), &DiscoverConfig::default(), &process_env()).unwrap();
        let raw = discover(app.path(), &unsandboxed(), &process_env()).unwrap();

        assert_eq!(raw.executable, vec!["./main.py"]);
        assert!(wrapped.executable.len() > raw.executable.len());
        assert_eq!(raw.working_directory, wrapped.working_directory);
    }

    #[test]
    fn test_declared_env_passes_through() {
        let app = script_app();
        write_file(
            app.path(),
            ".env",
            "DATABASE_URL=sqlite:///data/app.db\nNOT A VALID LINE\nMODE=prod\n",
            0o644,
        );

        let descriptor = discover(app.path(), &unsandboxed(), &process_env()).unwrap();
        assert_eq!(
            &descriptor.envs[1..],
            &[
                "DATABASE_URL=sqlite:///data/app.db".to_string(),
                "MODE=prod".to_string(),
                "PATH=/usr/bin:/bin".to_string(),
            ]
        );
    }

    #[test]
    fn test_restricted_network() {
        let app = script_app();
        let config = DiscoverConfig {
            sandbox: SandboxSettings {
                unrestricted_network: false,
                connect_tcp: vec![443],
                ..Default::default()
            },
            ..Default::default()
        };

        let descriptor = discover(app.path(), &config, &process_env()).unwrap();
        assert!(
            !descriptor
                .executable
                .contains(&"--unrestricted-network".to_string())
        );
        assert_eq!(flag_value(&descriptor.executable, "--connect-tcp"), Some("443"));
    }
}

// ============================================================================
// Binary Contract
// ============================================================================

mod binary {
    use super::*;

    fn run(args: &[&str], config_home: &Path) -> std::process::Output {
        Command::new(env!("CARGO_BIN_EXE_discover-app"))
            .args(args)
            .env_remove("REVERSE_PROXY_TO")
            .env_remove("REVERSE_BIN_DISCOVER_CONFIG")
            .env_remove("RUST_LOG")
            .env("XDG_CONFIG_HOME", config_home)
            .output()
            .expect("failed to run discover-app")
    }

    #[test]
    fn test_success_prints_single_descriptor() {
        let app = script_app();
        let config_home = tempdir().unwrap();

        let output = run(&[app.path().to_str().unwrap()], config_home.path());
        assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

        let stdout = String::from_utf8(output.stdout).unwrap();
        assert_eq!(stdout.lines().count(), 1);
        let descriptor: LaunchDescriptor = serde_json::from_str(stdout.trim()).unwrap();
        assert_eq!(descriptor.executable[0], "landrun");
        assert!(descriptor.reverse_proxy_to.starts_with("127.0.0.1:"));
    }

    #[test]
    fn test_no_sandbox_flag() {
        let app = script_app();
        let config_home = tempdir().unwrap();

        let output = run(
            &["--no-sandbox", app.path().to_str().unwrap()],
            config_home.path(),
        );
        assert!(output.status.success());
        let descriptor: LaunchDescriptor = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(descriptor.executable, vec!["./main.py"]);

        let stderr = String::from_utf8_lossy(&output.stderr);
        assert_eq!(stderr.matches("Sandbox disabled").count(), 1, "stderr: {stderr}");
    }

    #[test]
    fn test_missing_directory_exits_1() {
        let dir = tempdir().unwrap();
        let config_home = tempdir().unwrap();
        let missing = dir.path().join("missing");

        let output = run(&[missing.to_str().unwrap()], config_home.path());
        assert_eq!(output.status.code(), Some(1));
        assert!(output.stdout.is_empty());
        assert!(String::from_utf8_lossy(&output.stderr).contains("does not exist"));
    }

    #[test]
    fn test_no_entrypoint_exits_1() {
        let app = tempdir().unwrap();
        let config_home = tempdir().unwrap();

        let output = run(&[app.path().to_str().unwrap()], config_home.path());
        assert_eq!(output.status.code(), Some(1));
        assert!(output.stdout.is_empty());
        assert!(String::from_utf8_lossy(&output.stderr).contains("no supported entrypoint"));
    }

    #[test]
    fn test_absolute_socket_exits_1() {
        let app = script_app();
        let config_home = tempdir().unwrap();
        write_file(app.path(), ".env", "REVERSE_PROXY_TO=unix//tmp/app.sock\n", 0o644);

        let output = run(&[app.path().to_str().unwrap()], config_home.path());
        assert_eq!(output.status.code(), Some(1));
        assert!(output.stdout.is_empty());
        assert!(String::from_utf8_lossy(&output.stderr).contains("must be relative"));
    }

    #[test]
    fn test_user_config_is_honoured() {
        let app = script_app();
        let config_home = tempdir().unwrap();
        let config_dir = config_home.path().join("reverse-bin");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("discover.toml"),
            "[sandbox]\ntool = \"/usr/local/bin/landrun\"\n",
        )
        .unwrap();

        let output = run(&[app.path().to_str().unwrap()], config_home.path());
        assert!(output.status.success());
        let descriptor: LaunchDescriptor = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(descriptor.executable[0], "/usr/local/bin/landrun");
    }
}
