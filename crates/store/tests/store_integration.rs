//! On-disk store behavior: persistence across reopen and cascade rules.

use chrono::Utc;
use fc_store::Store;

use fc_domain::item::{CaptureContext, ClipboardItem};
use fc_domain::session::{Session, SessionStatus, SessionType};

#[test]
fn rows_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flowclip.db");

    let item = ClipboardItem::new(
        "Shangri-La Hotel Toronto".into(),
        CaptureContext {
            source_app: Some("Safari".into()),
            ..Default::default()
        },
    );
    let session = Session::new(
        SessionType::HotelResearch,
        "Hotel Research — Toronto".into(),
        Utc::now(),
    );

    {
        let store = Store::open(&path).unwrap();
        store.insert_item(&item).unwrap();
        store.create_session(&session).unwrap();
        store.add_session_member(session.id, item.id).unwrap();
    }

    let store = Store::open(&path).unwrap();
    let got = store.get_item(item.id).unwrap();
    assert_eq!(got.content, "Shangri-La Hotel Toronto");
    assert_eq!(got.source_app.as_deref(), Some("Safari"));

    let members = store.get_session_members_ordered(session.id).unwrap();
    assert_eq!(members.len(), 1);

    let hits = store.search("Shangri-La Toronto", 10).unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn content_preserved_byte_for_byte() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("db.sqlite")).unwrap();

    let content = "line one\n\ttabbed — with unicode: åß∂ ❄\r\nquotes: \"x\" 'y'";
    let item = ClipboardItem::new(content.to_string(), CaptureContext::default());
    store.insert_item(&item).unwrap();

    assert_eq!(store.get_item(item.id).unwrap().content, content);
}

#[test]
fn session_delete_cascades_but_items_survive() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("db.sqlite")).unwrap();

    let item = ClipboardItem::new("orphan check".into(), CaptureContext::default());
    store.insert_item(&item).unwrap();
    let session = Session::new(SessionType::GeneralResearch, "General Research".into(), Utc::now());
    store.create_session(&session).unwrap();
    store.add_session_member(session.id, item.id).unwrap();
    store
        .update_session_status(session.id, SessionStatus::Completed)
        .unwrap();

    store.delete_session(session.id).unwrap();
    assert!(store.get_item(item.id).is_ok());
}
