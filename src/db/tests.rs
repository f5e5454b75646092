use tempfile::TempDir;

use super::*;

fn new_round(n: u32) -> NewRound {
    NewRound {
        image_url: format!("/artifacts/s/minimaps/round_{n:02}.png"),
        full_image_url: Some(format!("/artifacts/s/full_screenshots/round_{n:02}_full.png")),
        timestamp: Some(n as f64 * 100.0),
    }
}

fn local(path: &str) -> VideoSource {
    VideoSource::LocalPath(path.to_string())
}

async fn assert_counts_consistent(db: &Database) {
    let sessions = db.list_sessions().await.unwrap();
    let counts = db.aggregate_counts().await.unwrap();
    let summed: u64 = sessions.iter().map(|s| s.round_count as u64).sum();
    assert_eq!(counts.total_sessions, sessions.len() as u64);
    assert_eq!(counts.total_rounds, summed);
}

#[tokio::test]
async fn create_and_get_session() {
    let db = Database::in_memory().unwrap();
    let session = db
        .create_session(local("v.mp4"), vec!["scrim".into(), " ".into(), "scrim".into()])
        .await
        .unwrap();

    assert!(session.session_id.starts_with("vlr_"));
    assert_eq!(session.status, SessionStatus::Pending);
    assert_eq!(session.round_count, 0);
    assert_eq!(session.tags, vec!["scrim".to_string()]);

    let loaded = db.get_session(&session.session_id).await.unwrap().unwrap();
    assert_eq!(loaded, session);

    assert!(db.get_session("vlr_missing").await.unwrap().is_none());
}

#[tokio::test]
async fn session_ids_are_unique() {
    let db = Database::in_memory().unwrap();
    let a = db.create_session(local("v.mp4"), vec![]).await.unwrap();
    let b = db.create_session(local("v.mp4"), vec![]).await.unwrap();
    assert_ne!(a.session_id, b.session_id);
}

#[tokio::test]
async fn listing_is_ordered_by_creation() {
    let db = Database::in_memory().unwrap();
    let mut created = Vec::new();
    for i in 0..5 {
        let session = db
            .create_session(VideoSource::RemoteUrl(format!("https://example.com/{i}")), vec![])
            .await
            .unwrap();
        created.push(session.session_id);
    }

    let first: Vec<String> = db
        .list_sessions()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.session_id)
        .collect();
    let second: Vec<String> = db
        .list_sessions()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.session_id)
        .collect();

    assert_eq!(first, created);
    assert_eq!(first, second);

    let latest = db.latest_session().await.unwrap().unwrap();
    assert_eq!(Some(&latest.session_id), created.last());
}

#[tokio::test]
async fn rounds_are_numbered_densely() {
    let db = Database::in_memory().unwrap();
    let session = db.create_session(local("v.mp4"), vec![]).await.unwrap();

    for n in 1..=4 {
        let round = db.append_round(&session.session_id, new_round(n)).await.unwrap();
        assert_eq!(round.round_number, n);
        assert_eq!(round.session_id, session.session_id);
    }

    let rounds = db.list_rounds_for(&session.session_id).await.unwrap();
    let numbers: Vec<u32> = rounds.iter().map(|r| r.round_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert_eq!(rounds[2], Round {
        session_id: session.session_id.clone(),
        round_number: 3,
        image_url: "/artifacts/s/minimaps/round_03.png".into(),
        full_image_url: Some("/artifacts/s/full_screenshots/round_03_full.png".into()),
        timestamp: Some(300.0),
    });

    let reloaded = db.get_session(&session.session_id).await.unwrap().unwrap();
    assert_eq!(reloaded.round_count, 4);
}

#[tokio::test]
async fn numbering_is_per_session() {
    let db = Database::in_memory().unwrap();
    let a = db.create_session(local("a.mp4"), vec![]).await.unwrap();
    let b = db.create_session(local("b.mp4"), vec![]).await.unwrap();

    db.append_round(&a.session_id, new_round(1)).await.unwrap();
    db.append_round(&a.session_id, new_round(2)).await.unwrap();
    let first_b = db.append_round(&b.session_id, new_round(1)).await.unwrap();

    assert_eq!(first_b.round_number, 1);
    assert_counts_consistent(&db).await;
    assert_eq!(db.aggregate_counts().await.unwrap(), AggregateCounts {
        total_sessions: 2,
        total_rounds: 3,
    });
}

#[tokio::test]
async fn invalid_rounds_are_not_recorded() {
    let db = Database::in_memory().unwrap();
    let session = db.create_session(local("v.mp4"), vec![]).await.unwrap();

    let blank = NewRound {
        image_url: "  ".into(),
        full_image_url: None,
        timestamp: None,
    };
    assert!(db.append_round(&session.session_id, blank).await.is_err());

    let negative = NewRound {
        image_url: "round.png".into(),
        full_image_url: None,
        timestamp: Some(-3.0),
    };
    assert!(db.append_round(&session.session_id, negative).await.is_err());

    assert!(db.append_round("vlr_missing", new_round(1)).await.is_err());

    assert!(db.list_rounds_for(&session.session_id).await.unwrap().is_empty());
    assert_counts_consistent(&db).await;

    // A rejected round does not burn a number.
    let ok = db.append_round(&session.session_id, new_round(1)).await.unwrap();
    assert_eq!(ok.round_number, 1);
}

#[tokio::test]
async fn status_updates_and_tags() {
    let db = Database::in_memory().unwrap();
    let session = db.create_session(local("v.mp4"), vec!["b".into()]).await.unwrap();

    db.mark_session_status(&session.session_id, SessionStatus::Running).await.unwrap();
    let tagged = db
        .add_session_tags(&session.session_id, vec!["a".into(), "b".into()])
        .await
        .unwrap();
    assert_eq!(tagged.tags, vec!["a".to_string(), "b".to_string()]);

    let loaded = db.get_session(&session.session_id).await.unwrap().unwrap();
    assert_eq!(loaded.status, SessionStatus::Running);
    assert_eq!(loaded.tags, tagged.tags);

    assert!(db.mark_session_status("vlr_missing", SessionStatus::Completed).await.is_err());
}

#[tokio::test]
async fn listing_with_rounds_matches_counts() {
    let db = Database::in_memory().unwrap();
    let a = db.create_session(local("a.mp4"), vec![]).await.unwrap();
    let b = db.create_session(local("b.mp4"), vec![]).await.unwrap();
    for n in 1..=3 {
        db.append_round(&a.session_id, new_round(n)).await.unwrap();
    }
    db.append_round(&b.session_id, new_round(1)).await.unwrap();

    let listing = db.list_sessions_with_rounds().await.unwrap();
    assert_eq!(listing.total_sessions, 2);
    assert_eq!(listing.total_rounds, 4);
    assert_eq!(listing.sessions[0].session.session_id, a.session_id);
    assert_eq!(listing.sessions[0].rounds.len(), 3);
    assert_eq!(listing.sessions[1].rounds.len(), 1);
    for entry in &listing.sessions {
        assert_eq!(entry.session.round_count as usize, entry.rounds.len());
    }
}

#[tokio::test]
async fn recovery_marks_dangling_sessions_errored() {
    let db = Database::in_memory().unwrap();
    let pending = db.create_session(local("a.mp4"), vec![]).await.unwrap();
    let running = db.create_session(local("b.mp4"), vec![]).await.unwrap();
    let done = db.create_session(local("c.mp4"), vec![]).await.unwrap();
    db.mark_session_status(&running.session_id, SessionStatus::Running).await.unwrap();
    db.mark_session_status(&done.session_id, SessionStatus::Completed).await.unwrap();

    let recovered = db.recover_interrupted_sessions().await.unwrap();
    assert_eq!(recovered, vec![pending.session_id.clone(), running.session_id.clone()]);

    for id in &recovered {
        let session = db.get_session(id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Errored);
    }
    let untouched = db.get_session(&done.session_id).await.unwrap().unwrap();
    assert_eq!(untouched.status, SessionStatus::Completed);

    assert!(db.recover_interrupted_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn file_backed_registry_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("nested").join("vlrscout.sqlite3");

    let session_id = {
        let db = Database::new(db_path.clone()).unwrap();
        assert_eq!(db.path(), Some(db_path.as_path()));
        let session = db.create_session(local("v.mp4"), vec![]).await.unwrap();
        db.append_round(&session.session_id, new_round(1)).await.unwrap();
        session.session_id
    };

    let reopened = Database::new(db_path).unwrap();
    let rounds = reopened.list_rounds_for(&session_id).await.unwrap();
    assert_eq!(rounds.len(), 1);
    assert_eq!(reopened.aggregate_counts().await.unwrap().total_rounds, 1);
}
