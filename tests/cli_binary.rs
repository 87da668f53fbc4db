use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

const SECRET: &str = "binary-test-secret-key-that-is-long-enough";

struct Sandbox {
    dir: tempfile::TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn db_path(&self) -> PathBuf {
        self.path().join("site").join("modweb.sqlite")
    }

    fn site_dir(&self) -> PathBuf {
        let site = self.path().join("site");
        fs::create_dir_all(&site).unwrap();
        site
    }

    fn write_config(&self, extra: &str) -> PathBuf {
        let path = self.path().join("modweb.test.toml");
        let body = format!(
            r#"
[basic]
secret_key = "{SECRET}"
database_url = "sqlite:{db}"

[catalog]
source = "declared"
modules = [
    {{ name = "dns", module_type = "expansion" }},
    {{ name = "cve", module_type = "expansion" }},
    {{ name = "yara", module_type = "expansion" }},
]

{extra}
"#,
            db = self.db_path().display()
        );
        fs::write(&path, body).unwrap();
        path
    }

    fn command(&self, config: &Path, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_modweb"));
        cmd.args(args)
            .current_dir(self.site_dir())
            .env("MODWEB_CONFIG", config)
            .env("RUST_LOG", "modweb=info")
            .env_remove("MODWEB_RUN_MAIN");
        cmd
    }

    fn run(&self, config: &Path, args: &[&str]) -> Output {
        self.command(config, args).output().expect("run modweb")
    }
}

fn wait_for_port(port: u16, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if std::net::TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[test]
fn no_flags_prints_help_and_touches_nothing() {
    let sb = Sandbox::new();
    let cfg = sb.write_config("");
    let out = sb.run(&cfg, &[]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("--db-init"));
    assert!(!sb.db_path().exists());
}

#[test]
fn conflicting_flags_exit_with_usage_code() {
    let sb = Sandbox::new();
    let cfg = sb.write_config("");
    let out = sb.run(&cfg, &["--dev", "--db-init"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(!sb.db_path().exists());
}

#[test]
fn db_init_is_idempotent_and_prints_password_once() {
    let sb = Sandbox::new();
    let cfg = sb.write_config("");

    let first = sb.run(&cfg, &["--db-init"]);
    assert_eq!(first.status.code(), Some(0), "{first:?}");
    let stdout = String::from_utf8_lossy(&first.stdout);
    assert_eq!(stdout.matches("Admin password:").count(), 1);
    assert!(stdout.contains("3 modules"));
    assert!(sb.db_path().exists());

    let second = sb.run(&cfg, &["--db-init"]);
    assert_eq!(second.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&second.stdout);
    assert!(!stdout.contains("Admin password:"));
    assert!(stdout.contains("Database initialized"));
}

#[test]
fn db_init_without_secret_key_fails() {
    let sb = Sandbox::new();
    let cfg = sb.path().join("bare.toml");
    fs::write(
        &cfg,
        format!("[basic]\ndatabase_url = \"sqlite:{}\"\n", sb.db_path().display()),
    )
    .unwrap();
    let out = sb.run(&cfg, &["--db-init"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(!sb.db_path().exists());
}

#[test]
fn db_upgrade_with_missing_tool_fails_without_touching_db() {
    let sb = Sandbox::new();
    let cfg = sb.write_config("[migrations]\nprogram = \"modweb-missing-migration-tool\"\n");
    let out = sb.run(&cfg, &["--db-upgrade"]);
    assert_eq!(out.status.code(), Some(127));
    assert!(!sb.db_path().exists());
}

#[test]
fn dev_run_stops_companion_on_interrupt() {
    let sb = Sandbox::new();
    let port = free_port();
    let marker = sb.path().join("companion.out");
    let started = sb.path().join("companion.started");
    let extra = format!(
        r#"
[companion]
program = "sh"
args = ["-c", "echo started > '{started}'; trap 'echo term > {marker}; exit 0' TERM; while :; do sleep 0.05; done"]
readiness_delay_ms = 300
stop_timeout_ms = 2000
"#,
        started = started.display(),
        marker = marker.display(),
    );
    let cfg = sb.write_config(&extra);

    // init first so the server has a schema to read from
    assert_eq!(sb.run(&cfg, &["--db-init"]).status.code(), Some(0));

    let mut child = sb
        .command(&cfg, &["--dev"])
        .env("MODWEB_BASIC__PORT", port.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn modweb --dev");

    let deadline = Instant::now() + Duration::from_secs(15);
    let mut up = false;
    while Instant::now() < deadline {
        if std::net::TcpStream::connect(("127.0.0.1", port)).is_ok() {
            up = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(up, "server never started listening");
    assert!(started.exists(), "companion was not started before the server");
    assert!(!marker.exists());

    let rc = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGINT) };
    assert_eq!(rc, 0);
    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(0));
    assert_eq!(fs::read_to_string(&marker).unwrap().trim(), "term");
}

#[test]
fn dev_run_as_reload_child_never_starts_companion() {
    let sb = Sandbox::new();
    let port = free_port();
    let started = sb.path().join("companion.started");
    let extra = format!(
        "[companion]\nprogram = \"sh\"\nargs = [\"-c\", \"echo started > '{}'; sleep 30\"]\nreadiness_delay_ms = 100\n",
        started.display()
    );
    let cfg = sb.write_config(&extra);
    assert_eq!(sb.run(&cfg, &["--db-init"]).status.code(), Some(0));

    let mut child = sb
        .command(&cfg, &["--dev"])
        .env("MODWEB_BASIC__PORT", port.to_string())
        .env("MODWEB_RUN_MAIN", "true")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn modweb --dev");

    let deadline = Instant::now() + Duration::from_secs(15);
    while Instant::now() < deadline
        && std::net::TcpStream::connect(("127.0.0.1", port)).is_err()
    {
        std::thread::sleep(Duration::from_millis(50));
    }

    unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGTERM) };
    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(0));
    assert!(!started.exists());
}

#[test]
fn broken_configuration_does_not_block_help_or_usage() {
    let sb = Sandbox::new();
    let missing = sb.path().join("nowhere.toml");

    let out = sb.run(&missing, &[]);
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).contains("--db-init"));

    let cfg = sb.write_config("");
    let out = sb
        .command(&cfg, &["--dev", "--db-init"])
        .env("MODWEB_BASIC__PORT", "not-a-port")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));

    let out = sb.run(&missing, &["--version"]);
    assert_eq!(out.status.code(), Some(0));

    // commands that need configuration still report it
    let out = sb.run(&missing, &["--db-init"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(!sb.db_path().exists());
}

#[test]
fn dev_reload_keeps_single_companion() {
    let sb = Sandbox::new();
    let port = free_port();
    let watched = sb.site_dir().join("src");
    fs::create_dir_all(&watched).unwrap();
    fs::write(watched.join("a.rs"), "fn a() {}").unwrap();
    let starts = sb.path().join("companion.starts");
    let marker = sb.path().join("companion.out");
    let log = sb.path().join("modweb.log");
    let extra = format!(
        r#"
[companion]
program = "sh"
args = ["-c", "echo s >> '{starts}'; trap 'echo term >> {marker}; exit 0' TERM; while :; do sleep 0.05; done"]
readiness_delay_ms = 200
stop_timeout_ms = 2000

[reload]
enabled = true
watch_paths = ["{watched}"]
debounce_ms = 100
"#,
        starts = starts.display(),
        marker = marker.display(),
        watched = watched.display(),
    );
    let cfg = sb.write_config(&extra);
    assert_eq!(sb.run(&cfg, &["--db-init"]).status.code(), Some(0));

    let mut parent = sb
        .command(&cfg, &["--dev"])
        .env("MODWEB_BASIC__PORT", port.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::from(fs::File::create(&log).unwrap()))
        .spawn()
        .expect("spawn modweb --dev");
    assert!(wait_for_port(port, Duration::from_secs(15)), "first child never listened");

    fs::write(watched.join("b.rs"), "fn b() {}").unwrap();
    let deadline = Instant::now() + Duration::from_secs(15);
    let mut restarted = false;
    while Instant::now() < deadline {
        let text = fs::read_to_string(&log).unwrap_or_default();
        if text.matches("started reload child").count() >= 2 {
            restarted = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(restarted, "child was not restarted after a source change");
    assert!(wait_for_port(port, Duration::from_secs(15)), "restarted child never listened");

    let rc = unsafe { libc::kill(parent.id() as libc::pid_t, libc::SIGINT) };
    assert_eq!(rc, 0);
    let status = parent.wait().unwrap();
    assert_eq!(status.code(), Some(0));

    assert_eq!(fs::read_to_string(&starts).unwrap(), "s\n");
    assert_eq!(fs::read_to_string(&marker).unwrap(), "term\n");
}

#[test]
fn production_server_serves_without_companion() {
    let sb = Sandbox::new();
    let port = free_port();
    let started = sb.path().join("companion.started");
    let extra = format!(
        "[companion]\nprogram = \"sh\"\nargs = [\"-c\", \"echo started > '{}'\"]\n",
        started.display()
    );
    let cfg = sb.write_config(&extra);
    assert_eq!(sb.run(&cfg, &["--db-init"]).status.code(), Some(0));

    let mut server = Command::new(env!("CARGO_BIN_EXE_modweb-server"))
        .current_dir(sb.site_dir())
        .env("MODWEB_CONFIG", &cfg)
        .env("MODWEB_BASIC__PORT", port.to_string())
        .env_remove("MODWEB_RUN_MAIN")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn modweb-server");
    assert!(wait_for_port(port, Duration::from_secs(15)), "server never listened");

    let mut stream = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains(r#""development":false"#), "{response}");

    unsafe { libc::kill(server.id() as libc::pid_t, libc::SIGTERM) };
    assert_eq!(server.wait().unwrap().code(), Some(0));
    assert!(!started.exists());
}
