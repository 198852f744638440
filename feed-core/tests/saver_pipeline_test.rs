use std::{fs, path::Path, sync::Arc};

use chrono::{FixedOffset, NaiveDate, TimeZone};
use feed_core::{
    comms::{BusPublisher, BusSubscriber, MemoryBus},
    config::FeedConfig,
    model::{Category, ChannelMessage, MarketPacket},
    saver::spawn_saver,
    stats::SaverStats,
};

// --- 1. Helpers ---

const KST_MINUTES: i32 = 540;

/// Epoch micros of a Seoul wall-clock time in March 2024.
fn kst_micros(day: u32, h: u32, m: u32) -> i64 {
    FixedOffset::east_opt(KST_MINUTES * 60)
        .unwrap()
        .from_local_datetime(
            &NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap(),
        )
        .unwrap()
        .timestamp_micros()
}

fn saver_config(log_dir: &Path) -> FeedConfig {
    let mut config = FeedConfig::default();
    config.saver.log_base_dir = Some(log_dir.to_path_buf());
    config.saver.poll_interval_ms = 10;
    config.session.utc_offset_minutes = Some(KST_MINUTES);
    config.validate_saver().unwrap();
    config
}

fn message(category: Category, micros: i64, payload: &[u8]) -> ChannelMessage {
    ChannelMessage::new(category, MarketPacket::new(micros, 10302, payload.to_vec()))
}

fn log_file(dir: &Path, date: &str, category: Category) -> std::path::PathBuf {
    dir.join(date).join(category.file_name())
}

fn start(
    bus: &MemoryBus,
    config: &FeedConfig,
    stats: Arc<SaverStats>,
) -> feed_core::saver::RunnerManager {
    let bus = bus.clone();
    spawn_saver(
        config,
        move |category| {
            Ok(BusSubscriber::new(Box::new(
                bus.subscriber(&[category.topic()]),
            )))
        },
        stats,
    )
    .unwrap()
}

// --- 2. Tests ---

#[test]
fn test_each_category_lands_in_its_own_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = saver_config(dir.path());
    let bus = MemoryBus::new(1024);
    let stats = Arc::new(SaverStats::new());

    let manager = start(&bus, &config, stats.clone());
    assert_eq!(manager.len(), 6);

    let mut publisher = BusPublisher::new(Box::new(bus.publisher()));
    for category in Category::ALL {
        for i in 0..3u8 {
            let payload = [category.index() as u8, i, b'\n', 0xFF];
            publisher
                .publish(&message(category, kst_micros(4, 10, i as u32), &payload))
                .unwrap();
        }
    }

    manager.shutdown();

    for category in Category::ALL {
        let bytes = fs::read(log_file(dir.path(), "2024-03-04", category)).unwrap();
        let c = category.index() as u8;
        let expected: Vec<u8> = (0..3u8).flat_map(|i| [c, i, b'\n', 0xFF]).collect();
        assert_eq!(bytes, expected, "{}", category);
        assert_eq!(stats.written.get(category), 3);
    }
}

#[test]
fn test_out_of_session_messages_are_not_written() {
    let dir = tempfile::tempdir().unwrap();
    let config = saver_config(dir.path());
    let bus = MemoryBus::new(1024);
    let stats = Arc::new(SaverStats::new());

    let manager = start(&bus, &config, stats.clone());
    let mut publisher = BusPublisher::new(Box::new(bus.publisher()));

    let category = Category::OptionsCallIndex;
    publisher
        .publish(&message(category, kst_micros(4, 8, 39), b"pre"))
        .unwrap();
    publisher
        .publish(&message(category, kst_micros(4, 8, 40), b"open"))
        .unwrap();
    publisher
        .publish(&message(category, kst_micros(4, 15, 50), b"post"))
        .unwrap();

    manager.shutdown();

    assert_eq!(
        fs::read(log_file(dir.path(), "2024-03-04", category)).unwrap(),
        b"open"
    );
    assert_eq!(stats.out_of_session.get(category), 2);
    assert_eq!(stats.written.get(category), 1);
}

#[test]
fn test_date_change_rotates_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = saver_config(dir.path());
    let bus = MemoryBus::new(1024);
    let stats = Arc::new(SaverStats::new());

    let manager = start(&bus, &config, stats.clone());
    let mut publisher = BusPublisher::new(Box::new(bus.publisher()));

    let category = Category::FuturesStock;
    publisher
        .publish(&message(category, kst_micros(4, 15, 0), b"monday"))
        .unwrap();
    publisher
        .publish(&message(category, kst_micros(5, 9, 0), b"tuesday"))
        .unwrap();

    manager.shutdown();

    assert_eq!(
        fs::read(log_file(dir.path(), "2024-03-04", category)).unwrap(),
        b"monday"
    );
    assert_eq!(
        fs::read(log_file(dir.path(), "2024-03-05", category)).unwrap(),
        b"tuesday"
    );
}

#[test]
fn test_disk_failure_is_isolated_to_one_category() {
    let dir = tempfile::tempdir().unwrap();
    let config = saver_config(dir.path());
    let bus = MemoryBus::new(1024);
    let stats = Arc::new(SaverStats::new());

    // A directory where the futures stock file belongs makes its open fail.
    fs::create_dir_all(log_file(dir.path(), "2024-03-04", Category::FuturesStock)).unwrap();

    let manager = start(&bus, &config, stats.clone());
    let mut publisher = BusPublisher::new(Box::new(bus.publisher()));

    for i in 0..5u8 {
        let micros = kst_micros(4, 11, i as u32);
        publisher
            .publish(&message(Category::FuturesStock, micros, &[i]))
            .unwrap();
        publisher
            .publish(&message(Category::FuturesIndex, micros, &[i]))
            .unwrap();
    }

    manager.shutdown();

    assert_eq!(
        fs::read(log_file(dir.path(), "2024-03-04", Category::FuturesIndex)).unwrap(),
        vec![0, 1, 2, 3, 4]
    );
    assert_eq!(stats.written.get(Category::FuturesIndex), 5);
    assert!(!stats.is_disk_failing(Category::FuturesIndex));

    assert!(stats.is_disk_failing(Category::FuturesStock));
    assert_eq!(stats.written.get(Category::FuturesStock), 0);
    assert_eq!(
        stats.write_errors.get(Category::FuturesStock) + stats.dropped_disk.get(Category::FuturesStock),
        5
    );
}

#[test]
fn test_shutdown_keeps_everything_already_received() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = saver_config(dir.path());
    config.saver.poll_interval_ms = 500;
    let bus = MemoryBus::new(100_000);
    let stats = Arc::new(SaverStats::new());

    let manager = start(&bus, &config, stats.clone());
    let mut publisher = BusPublisher::new(Box::new(bus.publisher()));

    let category = Category::OptionsPutIndex;
    let count = 5_000u32;
    for i in 0..count {
        publisher
            .publish(&message(category, kst_micros(4, 13, 0), &i.to_le_bytes()))
            .unwrap();
    }

    // Stop right away, with most of the burst still queued.
    manager.shutdown();

    let bytes = fs::read(log_file(dir.path(), "2024-03-04", category)).unwrap();
    let expected: Vec<u8> = (0..count).flat_map(|i| i.to_le_bytes()).collect();
    assert_eq!(bytes, expected);
    assert_eq!(stats.written.get(category), count as u64);
}
