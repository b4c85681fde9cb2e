//! Shared tests for SessionRepo implementations

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use chrono::{Duration, Utc};

use super::harness::{Fixture, numbers, seed_fixture};
use crate::{
    db::{DbPool, error::DbError},
    models::{
        CreateOperator, CreateService, NewSmsMessage, RepeatReservation, ReserveNumber,
        SessionStatus,
    },
};

fn reserve(fixture: &Fixture) -> ReserveNumber {
    ReserveNumber {
        service_id: fixture.service_id,
        country_id: fixture.country_id,
        operator_id: None,
        api_key_id: fixture.api_key_id,
    }
}

async fn test_reserve_next_takes_lowest_sort_order(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    db.phone_numbers()
        .insert_many(&numbers(&fixture, &["+79990000001", "+79990000002"]))
        .await
        .unwrap();
    db.phone_numbers().shuffle().await.unwrap();

    let first = db
        .phone_numbers()
        .get_by_number("+79990000001")
        .await
        .unwrap()
        .unwrap();
    let expected = if first.sort_order == 1 {
        "+79990000001"
    } else {
        "+79990000002"
    };

    let marked = Mutex::new(Vec::new());
    let hook = |n: &str| marked.lock().unwrap().push(n.to_string());
    let reservation = db
        .sessions()
        .reserve_next(reserve(&fixture), &hook)
        .await
        .unwrap()
        .expect("A number should be available");

    assert_eq!(reservation.number, expected);
    assert_eq!(*marked.lock().unwrap(), vec![expected.to_string()]);

    let session = db
        .sessions()
        .get_for_api_key(reservation.session_id, fixture.api_key_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::WaitCode);
    assert_eq!(session.phone_number, expected);
    assert_eq!(session.phone_number_id, Some(reservation.phone_number_id));

    let number = db.phone_numbers().get_by_number(expected).await.unwrap().unwrap();
    assert!(number.is_in_use);
}

async fn test_reserve_next_exhausts_pool(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    db.phone_numbers()
        .insert_many(&numbers(&fixture, &["+1"]))
        .await
        .unwrap();

    let sessions = db.sessions();
    assert!(sessions.reserve_next(reserve(&fixture), &|_| {}).await.unwrap().is_some());

    let called = Mutex::new(false);
    let hook = |_: &str| *called.lock().unwrap() = true;
    assert!(sessions.reserve_next(reserve(&fixture), &hook).await.unwrap().is_none());
    assert!(!*called.lock().unwrap());
}

async fn test_reserve_next_filters_operator(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    let mts = db
        .catalog()
        .create_operator(CreateOperator {
            name: "mts".into(),
            country_id: fixture.country_id,
        })
        .await
        .unwrap();

    let mut batch = numbers(&fixture, &["+1", "+2"]);
    batch[1].operator_id = Some(mts.id);
    db.phone_numbers().insert_many(&batch).await.unwrap();

    let reservation = db
        .sessions()
        .reserve_next(
            ReserveNumber {
                operator_id: Some(mts.id),
                ..reserve(&fixture)
            },
            &|_| {},
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reservation.number, "+2");
}

async fn test_concurrent_reservations_are_distinct(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    let pool: Vec<String> = (0..10).map(|i| format!("+7999000000{i}")).collect();
    let refs: Vec<&str> = pool.iter().map(String::as_str).collect();
    db.phone_numbers()
        .insert_many(&numbers(&fixture, &refs))
        .await
        .unwrap();

    let input = Arc::new(reserve(&fixture));
    let mut handles = Vec::new();
    for _ in 0..10 {
        let sessions = db.sessions();
        let input = Arc::clone(&input);
        handles.push(tokio::spawn(async move {
            sessions
                .reserve_next((*input).clone(), &|_| {})
                .await
                .unwrap()
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        let reservation = handle.await.unwrap().expect("Pool has enough numbers");
        assert!(seen.insert(reservation.number), "number handed out twice");
    }
    assert_eq!(seen.len(), 10);
}

async fn test_reserve_number_outcomes(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    db.phone_numbers()
        .insert_many(&numbers(&fixture, &["+79991112233"]))
        .await
        .unwrap();
    let sessions = db.sessions();

    let unknown = sessions
        .reserve_number("+70000000000", fixture.service_id, fixture.api_key_id, &|_| {})
        .await
        .unwrap();
    assert_eq!(unknown, RepeatReservation::UnknownNumber);

    let reserved = sessions
        .reserve_number("+79991112233", fixture.service_id, fixture.api_key_id, &|_| {})
        .await
        .unwrap();
    let RepeatReservation::Reserved(reservation) = reserved else {
        panic!("expected a reservation, got {reserved:?}");
    };
    assert_eq!(reservation.number, "+79991112233");

    let busy = sessions
        .reserve_number("+79991112233", fixture.service_id, fixture.api_key_id, &|_| {})
        .await
        .unwrap();
    assert_eq!(busy, RepeatReservation::Busy);
}

async fn test_sessions_scoped_to_api_key(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    db.phone_numbers()
        .insert_many(&numbers(&fixture, &["+1"]))
        .await
        .unwrap();
    let reservation = db
        .sessions()
        .reserve_next(reserve(&fixture), &|_| {})
        .await
        .unwrap()
        .unwrap();

    let other_key = fixture.api_key_id + 1;
    assert!(db
        .sessions()
        .get_for_api_key(reservation.session_id, other_key)
        .await
        .unwrap()
        .is_none());
}

async fn test_set_status_releases_number(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    db.phone_numbers()
        .insert_many(&numbers(&fixture, &["+1"]))
        .await
        .unwrap();
    let sessions = db.sessions();
    let reservation = sessions
        .reserve_next(reserve(&fixture), &|_| {})
        .await
        .unwrap()
        .unwrap();

    sessions
        .set_status(reservation.session_id, SessionStatus::WaitRetry, false)
        .await
        .unwrap();
    assert!(db.phone_numbers().get_by_number("+1").await.unwrap().unwrap().is_in_use);

    sessions
        .set_status(reservation.session_id, SessionStatus::Cancelled, true)
        .await
        .unwrap();
    let session = sessions
        .get_for_api_key(reservation.session_id, fixture.api_key_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
    assert!(!db.phone_numbers().get_by_number("+1").await.unwrap().unwrap().is_in_use);

    let missing = sessions.set_status(9999, SessionStatus::Finished, true).await;
    assert!(matches!(missing, Err(DbError::NotFound)));
}

async fn test_list_open_by_phone(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    let whatsapp = db
        .catalog()
        .create_service(CreateService {
            name: "WhatsApp".into(),
            code: "wa".into(),
        })
        .await
        .unwrap();
    db.phone_numbers()
        .insert_many(&numbers(&fixture, &["+1"]))
        .await
        .unwrap();
    let sessions = db.sessions();

    let first = sessions
        .reserve_next(reserve(&fixture), &|_| {})
        .await
        .unwrap()
        .unwrap();
    sessions
        .set_status(first.session_id, SessionStatus::Finished, true)
        .await
        .unwrap();

    let RepeatReservation::Reserved(second) = sessions
        .reserve_number("+1", whatsapp.id, fixture.api_key_id, &|_| {})
        .await
        .unwrap()
    else {
        panic!("number should be free again");
    };

    let open = sessions.list_open_by_phone("+1").await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, second.session_id);
    assert_eq!(open[0].service_code, "wa");
    assert_eq!(open[0].service_name, "WhatsApp");

    assert!(sessions.list_open_by_phone("+2").await.unwrap().is_empty());
}

async fn test_record_sms_marks_code_received(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    db.phone_numbers()
        .insert_many(&numbers(&fixture, &["+1"]))
        .await
        .unwrap();
    let sessions = db.sessions();
    let reservation = sessions
        .reserve_next(reserve(&fixture), &|_| {})
        .await
        .unwrap()
        .unwrap();

    assert!(sessions.latest_sms(reservation.session_id).await.unwrap().is_none());

    for (text, code) in [("first 1111", "1111"), ("second 2222", "2222")] {
        sessions
            .record_sms(NewSmsMessage {
                session_id: reservation.session_id,
                source_addr: "TGcode".into(),
                text: text.into(),
                code: Some(code.into()),
            })
            .await
            .unwrap();
    }

    let latest = sessions
        .latest_sms(reservation.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.code.as_deref(), Some("2222"));

    let session = sessions
        .get_for_api_key(reservation.session_id, fixture.api_key_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::CodeReceived);
    assert!(sessions.list_open_by_phone("+1").await.unwrap().is_empty());
}

async fn test_record_sms_keeps_closed_status(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    db.phone_numbers()
        .insert_many(&numbers(&fixture, &["+1", "+2"]))
        .await
        .unwrap();
    let sessions = db.sessions();

    for status in [SessionStatus::Cancelled, SessionStatus::Finished] {
        let reservation = sessions
            .reserve_next(reserve(&fixture), &|_| {})
            .await
            .unwrap()
            .unwrap();
        sessions
            .set_status(reservation.session_id, status, true)
            .await
            .unwrap();

        // A late message is still stored.
        sessions
            .record_sms(NewSmsMessage {
                session_id: reservation.session_id,
                source_addr: "TGcode".into(),
                text: "late 5555".into(),
                code: Some("5555".into()),
            })
            .await
            .unwrap();
        assert!(
            sessions
                .latest_sms(reservation.session_id)
                .await
                .unwrap()
                .is_some()
        );

        let session = sessions
            .get_for_api_key(reservation.session_id, fixture.api_key_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status, status);
    }
}

async fn test_get_and_list_sms(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    db.phone_numbers()
        .insert_many(&numbers(&fixture, &["+1"]))
        .await
        .unwrap();
    let sessions = db.sessions();
    let reservation = sessions
        .reserve_next(reserve(&fixture), &|_| {})
        .await
        .unwrap()
        .unwrap();

    let session = sessions.get(reservation.session_id).await.unwrap().unwrap();
    assert_eq!(session.phone_number, "+1");
    assert_eq!(session.api_key_id, Some(fixture.api_key_id));
    assert!(sessions.get(reservation.session_id + 100).await.unwrap().is_none());
    assert!(sessions.list_sms(reservation.session_id).await.unwrap().is_empty());

    for text in ["first 1111", "second 2222"] {
        sessions
            .record_sms(NewSmsMessage {
                session_id: reservation.session_id,
                source_addr: "TGcode".into(),
                text: text.into(),
                code: None,
            })
            .await
            .unwrap();
    }

    let messages = sessions.list_sms(reservation.session_id).await.unwrap();
    let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["second 2222", "first 1111"]);
}

async fn test_sender_names(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    let names = db.sessions().sender_names(fixture.service_id).await.unwrap();
    assert_eq!(names, vec!["TGcode"]);
    assert!(db.sessions().sender_names(9999).await.unwrap().is_empty());
}

async fn test_sms_counts_by_service(db: &DbPool) {
    let fixture = seed_fixture(db).await;
    db.phone_numbers()
        .insert_many(&numbers(&fixture, &["+1", "+2"]))
        .await
        .unwrap();
    let sessions = db.sessions();

    for _ in 0..2 {
        let reservation = sessions
            .reserve_next(reserve(&fixture), &|_| {})
            .await
            .unwrap()
            .unwrap();
        sessions
            .record_sms(NewSmsMessage {
                session_id: reservation.session_id,
                source_addr: "TGcode".into(),
                text: "code 1234".into(),
                code: Some("1234".into()),
            })
            .await
            .unwrap();
    }

    let now = Utc::now();
    let counts = sessions
        .sms_counts_by_service(now - Duration::hours(1), now + Duration::hours(1), None)
        .await
        .unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].api_key_id, fixture.api_key_id);
    assert_eq!(counts[0].service_name, "Telegram");
    assert_eq!(counts[0].count, 2);

    let other_key = sessions
        .sms_counts_by_service(
            now - Duration::hours(1),
            now + Duration::hours(1),
            Some(fixture.api_key_id + 1),
        )
        .await
        .unwrap();
    assert!(other_key.is_empty());

    let yesterday = sessions
        .sms_counts_by_service(now - Duration::days(2), now - Duration::days(1), None)
        .await
        .unwrap();
    assert!(yesterday.is_empty());
}

db_tests!(
    test_reserve_next_takes_lowest_sort_order,
    test_reserve_next_exhausts_pool,
    test_reserve_next_filters_operator,
    test_concurrent_reservations_are_distinct,
    test_reserve_number_outcomes,
    test_sessions_scoped_to_api_key,
    test_set_status_releases_number,
    test_list_open_by_phone,
    test_record_sms_marks_code_received,
    test_record_sms_keeps_closed_status,
    test_get_and_list_sms,
    test_sender_names,
    test_sms_counts_by_service,
);
