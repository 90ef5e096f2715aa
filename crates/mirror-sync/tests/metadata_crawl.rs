//! Metadata crawl against a scripted fleet.

mod common;

use std::sync::Arc;

use common::{two_device_fleet, FakeGateway, APP, APP_DATA_DIR};
use mirror_core::{DeviceSelector, PackageSelector};
use mirror_db::{Database, DbConfig};
use mirror_sync::{
    MetadataCrawler, MetadataMirror, Mirror, MirrorConfig, MirrorKind, SyncTask, TaskSpec,
};

fn wildcard_spec() -> TaskSpec {
    TaskSpec {
        device: DeviceSelector::Any,
        package: PackageSelector::Any,
        db_path: None,
        config: MirrorConfig::default(),
    }
}

async fn index_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

#[tokio::test]
async fn test_two_device_scenario() {
    let db = index_db().await;
    let mut crawler = MetadataCrawler::new(wildcard_spec(), Arc::new(two_device_fleet()), db.clone());

    crawler.run_cycle().await.unwrap();

    let index = db.index();
    let devices = index.devices().await.unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].serial, "R58M42ABCDE");
    assert_eq!(devices[0].name.as_deref(), Some("SM-G991B"));
    assert_eq!(devices[1].serial, "emulator-5554");
    assert_eq!(devices[1].name.as_deref(), Some("Pixel 7"));

    let packages = index.packages().await.unwrap();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].serial, "emulator-5554");
    assert_eq!(packages[0].name, APP);
    assert_eq!(packages[0].data_path, APP_DATA_DIR);

    let files = index.files().await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].serial, "emulator-5554");
    assert_eq!(files[0].package_name, APP);
    assert_eq!(files[0].dir_path, "/data/user/0/com.example.app/databases");
    assert_eq!(files[0].file_name, "main.db");
    assert_eq!(files[0].full_path, "/data/user/0/com.example.app/databases/main.db");
}

#[tokio::test]
async fn test_crawl_is_idempotent() {
    let db = index_db().await;
    let mut crawler = MetadataCrawler::new(wildcard_spec(), Arc::new(two_device_fleet()), db.clone());
    let index = db.index();

    crawler.run_cycle().await.unwrap();
    let first = (
        index.devices().await.unwrap(),
        index.packages().await.unwrap(),
        index.files().await.unwrap(),
    );

    crawler.run_cycle().await.unwrap();
    let second = (
        index.devices().await.unwrap(),
        index.packages().await.unwrap(),
        index.files().await.unwrap(),
    );

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_removed_device_disappears_from_index() {
    let gateway = Arc::new(FakeGateway::new());
    gateway.add_device("emulator-5554", Some("Pixel 7"));

    let db = index_db().await;
    let mut crawler = MetadataCrawler::new(wildcard_spec(), gateway.clone(), db.clone());
    crawler.run_cycle().await.unwrap();
    assert_eq!(db.index().counts().await.unwrap(), (1, 0, 0));

    // A fleet with no devices replaces the index with nothing.
    let empty = Arc::new(FakeGateway::new());
    let mut crawler = MetadataCrawler::new(wildcard_spec(), empty, db.clone());
    crawler.run_cycle().await.unwrap();
    assert_eq!(db.index().counts().await.unwrap(), (0, 0, 0));
}

#[tokio::test]
async fn test_transport_failure_keeps_previous_index() {
    let gateway = Arc::new(two_device_fleet());
    let db = index_db().await;
    let mut crawler = MetadataCrawler::new(wildcard_spec(), gateway.clone(), db.clone());

    crawler.run_cycle().await.unwrap();
    gateway.set_offline(true);

    assert!(crawler.run_cycle().await.is_err());
    assert_eq!(db.index().counts().await.unwrap(), (2, 1, 1));
}

#[tokio::test]
async fn test_metadata_mirror_from_connection_string() {
    let gateway = Arc::new(two_device_fleet());

    let mirror = Mirror::open("adb://*/*?showAllFilesInPackage=false", MirrorConfig::default(), gateway)
        .await
        .unwrap();
    assert_eq!(mirror.kind(), MirrorKind::Metadata);

    mirror.scheduler().wait_for_cycles(1).await;

    let Mirror::Metadata(metadata) = &mirror else {
        panic!("expected a metadata mirror");
    };
    assert_eq!(metadata.devices().await.unwrap().len(), 2);
    assert_eq!(metadata.packages().await.unwrap().len(), 1);
    assert!(metadata.files().await.unwrap().is_empty());

    mirror.close().await;
}

#[tokio::test]
async fn test_metadata_mirror_halts_when_bridge_is_down() {
    let gateway = Arc::new(two_device_fleet());
    gateway.set_offline(true);

    let mirror = MetadataMirror::connect(wildcard_spec(), gateway.clone()).await.unwrap();
    let state = mirror.scheduler().wait_for_state(|s| s.is_halted()).await;
    assert!(state.is_halted());

    // Nothing was indexed, and nothing runs until resumed.
    assert!(mirror.devices().await.unwrap().is_empty());
    assert_eq!(mirror.scheduler().cycles(), 1);

    mirror.close().await;
}
