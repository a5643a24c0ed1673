#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

pub fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_hddled") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "hddled.exe" } else { "hddled" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve hddled binary path for integration test"),
    }
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("hddled-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let output = Command::new(&bin_path)
        .args(args)
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute hddled command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// A throwaway machine: fake `/proc/vmstat`, fake sysfs GPIO pin, and the
/// pid/log/config files pointing at them.
pub struct Sandbox {
    pub dir: tempfile::TempDir,
    pub vmstat: PathBuf,
    pub gpio_root: PathBuf,
    pub pin: u32,
    pub pidfile: PathBuf,
    pub jsonl: PathBuf,
    pub config: PathBuf,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create sandbox");
        let root = dir.path();

        let vmstat = root.join("vmstat");
        fs::write(&vmstat, "nr_free_pages 12\npgpgin 100\npgpgout 50\n").unwrap();

        let pin = 199;
        let gpio_root = root.join("gpio");
        fs::create_dir_all(gpio_root.join(format!("gpio{pin}"))).unwrap();
        fs::write(gpio_root.join("export"), "").unwrap();
        fs::write(gpio_root.join(format!("gpio{pin}/direction")), "in\n").unwrap();
        fs::write(gpio_root.join(format!("gpio{pin}/value")), "1\n").unwrap();

        let pidfile = root.join("run").join("hddled.pid");
        let jsonl = root.join("log").join("activity.jsonl");
        let config = root.join("hddled.toml");
        fs::write(
            &config,
            format!(
                "[monitor]\npoll_interval_ms = 10\ncounter_source = {:?}\n\n\
                 [indicator]\ngpio_root = {:?}\npin = {pin}\n\n\
                 [paths]\npidfile = {:?}\njsonl_log = {:?}\n",
                vmstat.display().to_string(),
                gpio_root.display().to_string(),
                pidfile.display().to_string(),
                jsonl.display().to_string(),
            ),
        )
        .unwrap();

        Self {
            dir,
            vmstat,
            gpio_root,
            pin,
            pidfile,
            jsonl,
            config,
        }
    }

    pub fn value_path(&self) -> PathBuf {
        self.gpio_root.join(format!("gpio{}/value", self.pin))
    }

    pub fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap_or_default()
    }

    /// Start the daemon in the foreground against this sandbox.
    pub fn spawn(&self, extra: &[&str]) -> Child {
        Command::new(resolve_bin_path())
            .arg("--config")
            .arg(&self.config)
            .args(extra)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn hddled")
    }
}
