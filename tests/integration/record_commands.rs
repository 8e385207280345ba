use subwatch::export::CSV_HEADER;
use subwatch::render;
use subwatch::store::NewSubscription;
use subwatch::test_utils::Sent;

use crate::helpers::{Harness, utc};

fn seed(h: &Harness, description: &str, y: i32, m: u32, d: u32, days: u32) -> i64 {
    h.store
        .insert(&NewSubscription {
            description: description.to_owned(),
            buyer_ref: None,
            purchase_date: chrono::NaiveDate::from_ymd_opt(y, m, d).expect("date"),
            duration_days: days,
        })
        .expect("insert")
}

#[tokio::test]
async fn plan_a_lifecycle_through_commands() {
    let h = Harness::with_operators(&[1]);
    let id = seed(&h, "Plan A", 2025, 1, 1, 30);

    h.command(1, &format!("renew {id} 10")).await;
    assert_eq!(
        h.last_reply(),
        format!("#{id} renewed by 10 days. New expiry 2025-02-10 00:00.")
    );

    h.command(1, "expired").await;
    assert_eq!(h.transport.last().expect("sent").tokens(), vec![
        format!("renew:{id}"),
        format!("finish:{id}")
    ]);

    h.command(1, &format!("finish {id}")).await;
    assert_eq!(h.last_reply(), render::finished(id, true));

    h.clock.set(utc(2025, 2, 11));
    h.command(1, "expired").await;
    assert_eq!(h.last_reply(), render::NO_EXPIRED);
    h.command(1, "list").await;
    assert_eq!(h.last_reply(), render::NO_ACTIVE);
}

#[tokio::test]
async fn renew_button_uses_default_duration_and_accumulates() {
    let h = Harness::with_operators(&[1]);
    let id = seed(&h, "Plan", 2025, 1, 1, 30);
    h.button(1, &format!("renew:{id}")).await;
    h.button(1, &format!("renew:{id}")).await;
    let record = h.store.get(id).expect("record");
    assert_eq!(record.duration_days, 90);
    assert_eq!(record.expires_at, utc(2025, 4, 1));
}

#[tokio::test]
async fn finish_twice_is_not_an_error() {
    let h = Harness::with_operators(&[1]);
    let id = seed(&h, "Plan", 2025, 1, 1, 30);
    h.button(1, &format!("finish:{id}")).await;
    h.button(1, &format!("finish:{id}")).await;
    assert_eq!(h.last_reply(), render::finished(id, false));
    assert!(!h.store.get(id).expect("record").active);
}

#[tokio::test]
async fn unknown_ids_and_bad_arguments() {
    let h = Harness::with_operators(&[1]);

    h.command(1, "renew 404").await;
    assert_eq!(h.last_reply(), render::not_found(404));
    h.button(1, "finish:404").await;
    assert_eq!(h.last_reply(), render::not_found(404));

    h.command(1, "renew abc").await;
    assert_eq!(h.last_reply(), subwatch::command::RENEW_USAGE);
    h.button(1, "renew:abc").await;
    assert_eq!(h.last_reply(), render::INVALID_ARGUMENT);
    h.button(1, "backup:on:zero").await;
    assert_eq!(h.last_reply(), render::INVALID_ARGUMENT);

    h.button(1, "launch:missiles").await;
    assert_eq!(h.last_reply(), render::UNSUPPORTED);
    h.command(1, "frobnicate").await;
    assert_eq!(h.last_reply(), "Unsupported command.");

    assert!(h.store.list_all().expect("all").is_empty());
}

#[tokio::test]
async fn huge_renewal_is_refused_and_expiry_kept() {
    let h = Harness::with_operators(&[1]);
    let id = seed(&h, "Plan A", 2025, 1, 1, 30);

    h.command(1, &format!("renew {id} 4294967295")).await;
    assert_eq!(h.last_reply(), subwatch::command::RENEW_USAGE);
    h.button(1, "setdays:4294967295").await;
    assert_eq!(h.last_reply(), render::INVALID_ARGUMENT);

    let record = h.store.get(id).expect("record");
    assert_eq!(record.expires_at, utc(2025, 1, 31));
    assert_eq!(record.duration_days, 30);

    h.command(1, "list").await;
    assert!(!h.last_reply().contains("1970"), "{}", h.last_reply());
}

#[tokio::test]
async fn find_is_case_sensitive() {
    let h = Harness::with_operators(&[1]);
    seed(&h, "VPN Pro", 2025, 1, 1, 30);
    seed(&h, "Other", 2025, 1, 1, 30);
    seed(&h, "vpn-lite", 2025, 1, 1, 30);

    h.command(1, "find VPN").await;
    let texts = h.transport.texts();
    assert_eq!(texts[0], render::find_header("VPN", 1));
    assert!(texts[1].starts_with("#1 VPN Pro"));
    assert_eq!(texts.len(), 2);

    h.command(1, "find Netflix").await;
    assert_eq!(h.last_reply(), render::NO_MATCHES);
}

#[tokio::test]
async fn list_sends_one_card_per_active_record() {
    let h = Harness::with_operators(&[1]);
    let a = seed(&h, "Later", 2025, 3, 1, 30);
    let b = seed(&h, "Sooner", 2025, 2, 1, 30);
    h.store.finish(a).expect("finish");
    let _c = seed(&h, "Latest", 2025, 4, 1, 30);

    h.button(1, "menu:list").await;
    let texts = h.transport.texts();
    assert_eq!(texts.len(), 2);
    assert!(texts[0].starts_with(&format!("#{b} Sooner")));
    assert!(texts[1].contains("Latest"));
}

#[tokio::test]
async fn set_default_days_without_argument_offers_choices() {
    let h = Harness::with_operators(&[1]);
    h.command(1, "setdefaultdays").await;
    assert_eq!(h.transport.last().expect("sent").tokens(), vec![
        "setdays:30",
        "setdays:60",
        "setdays:90"
    ]);

    h.command(1, "set_default_days 45").await;
    assert_eq!(h.store.default_duration_days().expect("days"), 45);
    h.command(1, "setdefaultdays 0").await;
    assert_eq!(h.store.default_duration_days().expect("days"), 45);
}

#[tokio::test]
async fn export_sends_csv_document() {
    let h = Harness::with_operators(&[1]);
    seed(&h, "Plan, with comma", 2025, 1, 1, 30);

    h.command(1, "export").await;
    let Some(Sent::Document { chat_id, path, caption }) = h.transport.last() else {
        panic!("expected a document");
    };
    assert_eq!(chat_id, 1);
    assert!(path.starts_with(h.dir.path().join("exports")));
    assert_eq!(caption.as_deref(), Some("Export: 1 record(s)"));
    let csv = std::fs::read_to_string(&path).expect("read export");
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some(CSV_HEADER));
    assert!(lines.next().expect("row").starts_with("1,\"Plan, with comma\",,2025-01-01,30,"));
}

#[tokio::test]
async fn start_shows_main_menu() {
    let h = Harness::with_operators(&[1]);
    h.command(1, "start").await;
    let tokens = h.transport.last().expect("sent").tokens();
    assert!(tokens.contains(&"menu:add".to_owned()));
    assert!(tokens.contains(&"menu:backup".to_owned()));
}
