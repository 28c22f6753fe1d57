use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use prayer_reminder_lib::{
    save_settings, ActionEvent, Coordinates, FixedTimesSource, JsonFileStore, KeyValueStore,
    MemoryPlatform, MemoryStore, NotificationPlatform, NotificationRequest, Payload, PrayerName,
    ReminderApp, ReminderError, ReminderScheduler, ReminderSettings, TierSetting, DONE_ACTION_ID,
};

fn offset() -> FixedOffset {
    FixedOffset::east_opt(3 * 3600).unwrap()
}

fn source() -> FixedTimesSource {
    FixedTimesSource::from_clock_times(
        offset(),
        ["05:30", "07:00", "12:30", "15:45", "18:20", "19:50"],
    )
    .unwrap()
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
}

fn at(hm: &str) -> DateTime<FixedOffset> {
    let time = NaiveTime::parse_from_str(hm, "%H:%M").unwrap();
    offset().from_local_datetime(&day().and_time(time)).unwrap()
}

fn settings(log_dir: &std::path::Path) -> ReminderSettings {
    ReminderSettings {
        active: true,
        tiers: vec![
            TierSetting::new(25, 15),
            TierSetting::new(20, 10),
            TierSetting::new(15, 5),
            TierSetting::new(10, 2),
        ],
        log_directory: Some(log_dir.display().to_string()),
        ..Default::default()
    }
}

fn foreign(id: &str) -> NotificationRequest {
    NotificationRequest {
        id: id.to_string(),
        fire_at: at("23:00").with_timezone(&Utc),
        title: "other app".to_string(),
        body: String::new(),
        payload: Payload::new(),
    }
}

#[tokio::test]
async fn repeated_passes_leave_the_same_pending_set() {
    let dir = tempfile::tempdir().expect("tempdir");
    let platform = Arc::new(MemoryPlatform::new());
    let scheduler = ReminderScheduler::new(platform.clone(), Arc::new(MemoryStore::new()), source());
    platform.schedule(foreign("calendar_42")).await.unwrap();

    let first = scheduler.reconcile(&settings(dir.path()), at("13:00")).await.unwrap();
    let ids_first = platform.pending_ids().await;
    let second = scheduler.reconcile(&settings(dir.path()), at("13:00")).await.unwrap();
    let ids_second = platform.pending_ids().await;

    assert_eq!(first, second);
    assert_eq!(ids_first, ids_second);
    assert!(ids_second.contains(&"calendar_42".to_string()));
}

#[tokio::test]
async fn full_asr_window_gets_the_expected_offsets() {
    let dir = tempfile::tempdir().expect("tempdir");
    let platform = Arc::new(MemoryPlatform::new());
    let scheduler = ReminderScheduler::new(platform.clone(), Arc::new(MemoryStore::new()), source());
    scheduler.reconcile(&settings(dir.path()), at("13:00")).await.unwrap();

    let mut asr: Vec<String> = platform
        .pending_ids()
        .await
        .into_iter()
        .filter(|id| id.starts_with("prayer-reminder_2026-03-01_asr_") && !id.ends_with("_bitis"))
        .collect();
    asr.sort();
    let mut expected: Vec<String> = [(1, 25), (2, 20), (3, 15), (4, 10), (4, 8), (4, 6), (4, 4), (4, 2)]
        .iter()
        .map(|(tier, minutes)| format!("prayer-reminder_2026-03-01_asr_{tier}_{minutes}"))
        .collect();
    expected.sort();
    assert_eq!(asr, expected);
}

#[tokio::test]
async fn start_replays_the_launch_action_before_planning() {
    let dir = tempfile::tempdir().expect("tempdir");
    let platform = Arc::new(MemoryPlatform::new());
    let store = Arc::new(MemoryStore::new());
    save_settings(store.as_ref(), settings(dir.path())).await.unwrap();

    // the user tapped "done" while the app was not running
    platform
        .deliver_action(ActionEvent {
            action_id: DONE_ACTION_ID.to_string(),
            notification_id: "prayer-reminder_2026-03-01_asr_2_20".to_string(),
            payload: Payload::new(),
        })
        .await;

    let app = ReminderApp::start(platform.clone(), store, Arc::new(source()), at("18:00"))
        .await
        .unwrap();

    assert!(platform.has_handler().await);
    assert!(app.scheduler().ledger().is_satisfied(day(), PrayerName::Asr).await);
    let ids = platform.pending_ids().await;
    assert!(!ids.iter().any(|id| id.contains("_asr_")));
    assert!(ids.iter().any(|id| id.contains("_maghrib_")));

    let journal = dir.path().join("logs").join("2026-03-01.jsonl");
    let content = std::fs::read_to_string(journal).unwrap();
    assert!(content.lines().any(|line| line.contains("\"action\":\"complete\"")));
    assert!(content.lines().any(|line| line.contains("\"action\":\"reconcile\"")));

    let restored = app.undo(day(), PrayerName::Asr, at("18:00")).await.unwrap();
    assert!(restored > 0);
    assert!(platform.pending_ids().await.iter().any(|id| id.contains("_asr_")));
}

#[tokio::test]
async fn bad_location_clears_reminders_and_reports_the_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let platform = Arc::new(MemoryPlatform::new());
    let store = Arc::new(MemoryStore::new());
    save_settings(store.as_ref(), settings(dir.path())).await.unwrap();
    let app = ReminderApp::start(platform.clone(), store, Arc::new(source()), at("13:00"))
        .await
        .unwrap();
    assert!(!platform.pending_ids().await.is_empty());

    let err = app
        .update_location(Coordinates::new(120.0, 0.0), at("13:05"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReminderError::Computation(_)));
    assert_eq!(app.settings().await.coordinates, Coordinates::new(120.0, 0.0));

    let left: Vec<String> = platform
        .pending_ids()
        .await
        .into_iter()
        .filter(|id| id.starts_with("prayer-reminder_"))
        .collect();
    assert!(left.is_empty());

    app.update_location(Coordinates::default(), at("13:10")).await.unwrap();
    assert!(!platform.pending_ids().await.is_empty());
}

#[tokio::test]
async fn countdown_banners_follow_settings() {
    let dir = tempfile::tempdir().expect("tempdir");
    let platform = Arc::new(MemoryPlatform::new());
    let store = Arc::new(MemoryStore::new());
    let inactive = ReminderSettings {
        active: false,
        ..settings(dir.path())
    };
    save_settings(store.as_ref(), inactive).await.unwrap();
    let app = ReminderApp::start(platform.clone(), store, Arc::new(source()), at("13:00"))
        .await
        .unwrap();
    assert!(platform.pending_ids().await.is_empty());

    let mut enabled = settings(dir.path());
    enabled.countdown_enabled = true;
    app.save_settings(enabled, at("13:00")).await.unwrap();
    let banners: Vec<String> = platform
        .pending_ids()
        .await
        .into_iter()
        .filter(|id| id.starts_with("prayer-countdown_"))
        .collect();
    assert_eq!(banners.len(), 3);

    let mut disabled = app.settings().await;
    disabled.countdown_enabled = false;
    app.save_settings(disabled, at("13:01")).await.unwrap();
    assert!(!platform
        .pending_ids()
        .await
        .iter()
        .any(|id| id.starts_with("prayer-countdown_")));
}

#[tokio::test]
async fn file_store_keeps_settings_and_completions_across_restarts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("data").join("store.json");

    {
        let store = Arc::new(JsonFileStore::new(&path));
        let inactive = ReminderSettings {
            active: false,
            ..settings(dir.path())
        };
        save_settings(store.as_ref(), inactive).await.unwrap();
        let app = ReminderApp::start(
            Arc::new(MemoryPlatform::new()),
            store,
            Arc::new(source()),
            at("13:00"),
        )
        .await
        .unwrap();
        app.save_settings(settings(dir.path()), at("13:00")).await.unwrap();
        app.complete(PrayerName::Dhuhr, at("13:30")).await.unwrap();
    }

    let store = Arc::new(JsonFileStore::new(&path));
    assert!(store
        .get("completed_prayers_2026-03-01")
        .await
        .unwrap()
        .is_some());

    let platform = Arc::new(MemoryPlatform::new());
    let app = ReminderApp::start(platform.clone(), store, Arc::new(source()), at("14:00"))
        .await
        .unwrap();
    assert!(app.settings().await.active);
    let ids = platform.pending_ids().await;
    assert!(!ids.iter().any(|id| id.contains("_dhuhr_")));
    assert!(ids.iter().any(|id| id.contains("_asr_")));
}

#[tokio::test]
async fn kept_launch_action_is_not_reapplied_on_later_starts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let platform = Arc::new(MemoryPlatform::new());
    let store = Arc::new(MemoryStore::new());
    save_settings(store.as_ref(), settings(dir.path())).await.unwrap();
    platform
        .deliver_action(ActionEvent {
            action_id: DONE_ACTION_ID.to_string(),
            notification_id: "prayer-reminder_2026-03-01_asr_2_20".to_string(),
            payload: Payload::new(),
        })
        .await;

    let app = ReminderApp::start(platform.clone(), store.clone(), Arc::new(source()), at("16:00"))
        .await
        .unwrap();
    assert!(app.scheduler().ledger().is_satisfied(day(), PrayerName::Asr).await);
    app.undo(day(), PrayerName::Asr, at("16:05")).await.unwrap();

    let app = ReminderApp::start(platform.clone(), store.clone(), Arc::new(source()), at("17:00"))
        .await
        .unwrap();
    assert!(!app.scheduler().ledger().is_satisfied(day(), PrayerName::Asr).await);
    assert!(platform
        .pending_ids()
        .await
        .iter()
        .any(|id| id.starts_with("prayer-reminder_2026-03-01_asr_")));

    let next_day = day().succ_opt().unwrap();
    let next_start = offset()
        .from_local_datetime(&next_day.and_hms_opt(16, 0, 0).unwrap())
        .unwrap();
    let app = ReminderApp::start(platform.clone(), store, Arc::new(source()), next_start)
        .await
        .unwrap();
    assert!(!app.scheduler().ledger().is_satisfied(next_day, PrayerName::Asr).await);
    assert!(platform
        .pending_ids()
        .await
        .iter()
        .any(|id| id.starts_with("prayer-reminder_2026-03-02_asr_")));
}
