//! Scripted device fleet shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use mirror_sync::gateway::commands;
use mirror_sync::{DeviceHandle, MirrorConfig, ShellGateway, SyncError, SyncResult};

pub const APP: &str = "com.example.app";
pub const APP_DATA_DIR: &str = "/data/user/0/com.example.app";
pub const MAIN_DB: &str = "/data/data/com.example.app/databases/main.db";

pub const T1: &str = "2024-03-01 09:15:02.123456789 +0000";
pub const T2: &str = "2024-03-01 09:16:40.000000000 +0000";

struct FakePackage {
    name: String,
    debuggable: bool,
    data_dir: String,
    listing: String,
    /// remote path → (stat output, file bytes)
    databases: HashMap<String, (String, Vec<u8>)>,
}

struct FakeDevice {
    serial: String,
    model: Option<String>,
    packages: Vec<FakePackage>,
}

/// In-memory stand-in for adb. Answers the command shapes the engine sends.
#[derive(Default)]
pub struct FakeGateway {
    fleet: Mutex<Vec<FakeDevice>>,
    log: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&self, serial: &str, model: Option<&str>) {
        self.fleet.lock().unwrap().push(FakeDevice {
            serial: serial.to_string(),
            model: model.map(str::to_string),
            packages: Vec::new(),
        });
    }

    pub fn add_package(&self, serial: &str, name: &str, data_dir: &str, debuggable: bool) {
        let mut fleet = self.fleet.lock().unwrap();
        let device = fleet.iter_mut().find(|d| d.serial == serial).unwrap();
        device.packages.push(FakePackage {
            name: name.to_string(),
            debuggable,
            data_dir: data_dir.to_string(),
            listing: String::new(),
            databases: HashMap::new(),
        });
    }

    /// Sets the `ls -R -C -m -p <dataDir>` answer.
    pub fn set_listing(&self, serial: &str, package: &str, listing: &str) {
        self.with_package(serial, package, |p| p.listing = listing.to_string());
    }

    /// Places (or replaces) a database file with the given `stat -c %y` answer.
    pub fn put_database(&self, serial: &str, package: &str, remote_path: &str, stat: &str, bytes: &[u8]) {
        self.with_package(serial, package, |p| {
            p.databases
                .insert(remote_path.to_string(), (stat.to_string(), bytes.to_vec()));
        });
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every command sent so far, as `<serial>: <command>`.
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn with_package(&self, serial: &str, package: &str, f: impl FnOnce(&mut FakePackage)) {
        let mut fleet = self.fleet.lock().unwrap();
        let device = fleet.iter_mut().find(|d| d.serial == serial).unwrap();
        let package = device.packages.iter_mut().find(|p| p.name == package).unwrap();
        f(package);
    }

    fn respond(&self, device: &DeviceHandle, command: &str) -> SyncResult<String> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}: {}", device.serial(), command));

        let fleet = self.fleet.lock().unwrap();
        let dev = fleet
            .iter()
            .find(|d| d.serial == device.serial())
            .ok_or_else(|| SyncError::remote(device.serial(), command, "device not found"))?;

        if command == commands::PRODUCT_MODEL {
            return Ok(format!("{}\n", dev.model.as_deref().unwrap_or("")));
        }

        if command == commands::LIST_THIRD_PARTY_PACKAGES {
            return Ok(dev
                .packages
                .iter()
                .map(|p| format!("package:{}\n", p.name))
                .collect());
        }

        if let Some(name) = command.strip_prefix("dumpsys package ") {
            return Ok(match dev.packages.iter().find(|p| p.name == name) {
                Some(p) => format!(
                    "Packages:\n  Package [{}] (3f2a1b):\n    codePath=/data/app/{}\n    dataDir={}\n",
                    p.name, p.name, p.data_dir
                ),
                None => format!("Unable to find package: {}\n", name),
            });
        }

        let Some(rest) = command.strip_prefix("run-as ") else {
            return Err(SyncError::remote(device.serial(), command, "unsupported command"));
        };
        let (name, rest) = rest
            .split_once(' ')
            .ok_or_else(|| SyncError::remote(device.serial(), command, "malformed run-as"))?;

        let Some(package) = dev.packages.iter().find(|p| p.name == name) else {
            return Ok(format!("run-as: unknown package: {}\n", name));
        };
        if !package.debuggable {
            return Ok(format!("run-as: package not debuggable: {}\n", name));
        }

        if let Some(path) = rest.strip_prefix("ls -R -C -m -p ") {
            let package_root = format!("/data/data/{}", name);
            return Ok(if path == package_root {
                format!("{}:\ncache/, databases/\n", path)
            } else if path == package.data_dir {
                package.listing.clone()
            } else {
                format!("ls: {}: No such file or directory\n", path)
            });
        }

        if let Some(path) = rest.strip_prefix("stat -c %y ") {
            return Ok(match package.databases.get(path) {
                Some((stat, _)) => format!("{}\n", stat),
                None => format!("stat: '{}': No such file or directory\n", path),
            });
        }

        if let Some(path) = rest.strip_prefix("base64 -w 0 ") {
            return Ok(match package.databases.get(path) {
                Some((_, bytes)) => STANDARD.encode(bytes),
                None => String::new(),
            });
        }

        Err(SyncError::remote(device.serial(), command, "unsupported command"))
    }
}

#[async_trait]
impl ShellGateway for FakeGateway {
    async fn list_devices(&self) -> SyncResult<Vec<DeviceHandle>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Transport("connection refused".into()));
        }
        Ok(self
            .fleet
            .lock()
            .unwrap()
            .iter()
            .map(|d| DeviceHandle::new(d.serial.clone()))
            .collect())
    }

    async fn execute_shell(&self, device: &DeviceHandle, command: &str) -> SyncResult<String> {
        self.respond(device, command)
    }
}

/// Builds a SQLite file from `statements` and returns its bytes.
pub async fn sqlite_bytes(statements: &[&str]) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seed.db");

    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    for statement in statements {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;

    std::fs::read(&path).unwrap()
}

/// A notes database holding `count` rows.
pub async fn notes_db(count: usize) -> Vec<u8> {
    let mut statements = vec!["CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL)".to_string()];
    for i in 0..count {
        statements.push(format!("INSERT INTO notes (body) VALUES ('note {}')", i));
    }
    let refs: Vec<&str> = statements.iter().map(String::as_str).collect();
    sqlite_bytes(&refs).await
}

/// Default config with scratch copies kept under `scratch`.
pub fn config_in(scratch: &Path) -> MirrorConfig {
    let mut config = MirrorConfig::default();
    config.device.scratch_dir = Some(scratch.to_path_buf());
    config
}

/// Two devices from the end-to-end scenario: A can be crawled, B cannot.
pub fn two_device_fleet() -> FakeGateway {
    let gateway = FakeGateway::new();

    gateway.add_device("emulator-5554", Some("Pixel 7"));
    gateway.add_package("emulator-5554", APP, APP_DATA_DIR, true);
    gateway.set_listing(
        "emulator-5554",
        APP,
        "/data/user/0/com.example.app:\ndatabases/\n\n\
         /data/user/0/com.example.app/databases:\nmain.db\n",
    );

    gateway.add_device("R58M42ABCDE", Some("SM-G991B"));
    gateway.add_package("R58M42ABCDE", APP, APP_DATA_DIR, false);

    gateway
}
