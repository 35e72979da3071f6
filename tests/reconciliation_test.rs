mod common;

use common::*;
use giving_sync::domain::error::PipelineError;
use giving_sync::domain::id::ExternalId;
use giving_sync::domain::provider::{
    CardGateway, IntentSnapshot, MobileGatewayApi, ProviderClients, ProviderFuture,
};
use giving_sync::services::reconciliation::{
    BatchReport, ManualStatus, mark_status, reconcile_from_audit, reconcile_with_provider,
};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const DB: &str = "giving_sync_test_reconcile";

// ── Fakes ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeCard {
    answers: HashMap<String, Result<IntentSnapshot, String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCard {
    fn answer(mut self, id: &str, answer: Result<IntentSnapshot, &str>) -> Self {
        self.answers
            .insert(id.to_string(), answer.map_err(str::to_string));
        self
    }
}

impl CardGateway for FakeCard {
    fn retrieve_intent(&self, id: &ExternalId) -> ProviderFuture<'_, IntentSnapshot> {
        self.calls.lock().unwrap().push(id.as_str().to_string());
        let answer = self.answers.get(id.as_str()).cloned();
        Box::pin(async move {
            match answer {
                Some(Ok(snapshot)) => Ok(snapshot),
                Some(Err(msg)) => Err(PipelineError::Provider(msg)),
                None => Err(PipelineError::Provider("no such intent".into())),
            }
        })
    }
}

#[derive(Default)]
struct FakeGateway {
    response: Option<Value>,
    calls: Mutex<Vec<(Option<String>, Option<String>)>>,
}

impl MobileGatewayApi for FakeGateway {
    fn transaction_status<'a>(
        &'a self,
        order_tracking_id: Option<&'a str>,
        transaction_tracking_id: Option<&'a str>,
    ) -> ProviderFuture<'a, Option<Value>> {
        self.calls.lock().unwrap().push((
            order_tracking_id.map(str::to_string),
            transaction_tracking_id.map(str::to_string),
        ));
        let response = self.response.clone();
        Box::pin(async move { Ok(response) })
    }
}

fn snapshot(status: &str, amount_received: i64) -> IntentSnapshot {
    IntentSnapshot {
        status: Some(status.to_string()),
        amount_received: Some(amount_received),
        currency: Some("usd".to_string()),
    }
}

fn card_clients(card: FakeCard) -> ProviderClients {
    ProviderClients {
        card: Some(Arc::new(card)),
        mobile_gateway: None,
    }
}

// ── 1. one_failing_lookup_does_not_abort_the_batch ─────────────────────────

#[tokio::test]
async fn one_failing_lookup_does_not_abort_the_batch() {
    let Some(pool) = setup_pool(DB).await else { return };
    let pis: Vec<String> = (0..3).map(|_| unique("pi")).collect();
    let mut ids = Vec::new();
    for pi in &pis {
        ids.push(seed_payment(&pool, SeedPayment::new("card", "pending", pi)).await);
    }

    let card = FakeCard::default()
        .answer(&pis[0], Ok(snapshot("succeeded", 5000)))
        .answer(&pis[1], Err("api unavailable"))
        .answer(&pis[2], Ok(snapshot("canceled", 0)));
    let clients = card_clients(card);

    let report = reconcile_with_provider(&pool, &clients, &ids, "ops@example.org")
        .await
        .unwrap();
    assert_eq!(
        report,
        BatchReport {
            processed: 3,
            reconciled: 2,
            noop: 0,
            errors: 1,
        }
    );

    assert_eq!(payment_by_id(&pool, ids[0]).await.status, "succeeded");
    assert_eq!(payment_by_id(&pool, ids[1]).await.status, "pending");
    assert_eq!(payment_by_id(&pool, ids[2]).await.status, "canceled");

    let failed = webhooks_for(&pool, ids[1]).await;
    assert_eq!(failed.len(), 1);
    assert_eq!(
        failed[0].event_type.as_deref(),
        Some("admin.reconcile.provider.card.error")
    );
    assert_eq!(failed[0].raw_payload["admin"], "ops@example.org");
    assert!(
        failed[0].raw_payload["error"]
            .as_str()
            .unwrap()
            .contains("api unavailable")
    );

    for id in [ids[0], ids[2]] {
        let rows = webhooks_for(&pool, id).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type.as_deref(), Some("admin.reconcile.provider.card"));
    }
}

// ── 2. reconciliation_never_touches_amount ─────────────────────────────────

#[tokio::test]
async fn reconciliation_never_touches_amount() {
    let Some(pool) = setup_pool(DB).await else { return };
    let pi = unique("pi_amount");
    let id = seed_payment(&pool, SeedPayment::new("card", "processing", &pi)).await;

    let clients = card_clients(FakeCard::default().answer(&pi, Ok(snapshot("succeeded", 99_900))));
    reconcile_with_provider(&pool, &clients, &[id], "ops")
        .await
        .unwrap();

    let payment = payment_by_id(&pool, id).await;
    assert_eq!(payment.status, "succeeded");
    assert_eq!(payment.amount, Decimal::new(5000, 2));

    let rows = webhooks_for(&pool, id).await;
    assert_eq!(rows[0].raw_payload["amount_received"], 99_900);
    assert_eq!(rows[0].raw_payload["inferred_status"], "succeeded");
}

// ── 3. unchanged_status_is_audited_but_not_counted ─────────────────────────

#[tokio::test]
async fn unchanged_status_is_audited_but_not_counted() {
    let Some(pool) = setup_pool(DB).await else { return };
    let pi = unique("pi_same");
    let id = seed_payment(&pool, SeedPayment::new("card", "succeeded", &pi)).await;

    let clients = card_clients(FakeCard::default().answer(&pi, Ok(snapshot("succeeded", 5000))));
    let report = reconcile_with_provider(&pool, &clients, &[id], "ops")
        .await
        .unwrap();

    assert_eq!(report.reconciled, 0);
    assert_eq!(report.noop, 1);
    assert_eq!(webhooks_for(&pool, id).await.len(), 1);
}

// ── 4. gateway_prefers_captured_order_tracking_id ──────────────────────────

#[tokio::test]
async fn gateway_prefers_captured_order_tracking_id() {
    let Some(pool) = setup_pool(DB).await else { return };
    let tx = unique("tx_gw");
    let order = unique("ord");
    let mut seed = SeedPayment::new("mobile-gateway-A", "PENDING", &tx);
    seed.external_reference = Some("giving-ref");
    seed.metadata = Some(json!({"order_tracking_id": order}));
    let id = seed_payment(&pool, seed).await;

    let gateway = Arc::new(FakeGateway {
        response: Some(json!({"payment_status_description": "Completed", "status": "200"})),
        ..Default::default()
    });
    let clients = ProviderClients {
        card: None,
        mobile_gateway: Some(gateway.clone()),
    };

    let report = reconcile_with_provider(&pool, &clients, &[id], "ops")
        .await
        .unwrap();
    assert_eq!(report.reconciled, 1);
    assert_eq!(payment_by_id(&pool, id).await.status, "succeeded");
    assert_eq!(
        gateway.calls.lock().unwrap().as_slice(),
        &[(Some(order.clone()), Some(tx.clone()))]
    );

    let rows = webhooks_for(&pool, id).await;
    assert_eq!(
        rows[0].event_type.as_deref(),
        Some("admin.reconcile.provider.mobile-gateway-A")
    );
    assert_eq!(rows[0].raw_payload["order_tracking_id"], order.as_str());
}

// ── 5. gateway_without_answer_is_an_error_row ──────────────────────────────

#[tokio::test]
async fn gateway_without_answer_is_an_error_row() {
    let Some(pool) = setup_pool(DB).await else { return };
    let tx = unique("tx_silent");
    let id = seed_payment(&pool, SeedPayment::new("pesapal", "pending", &tx)).await;

    let clients = ProviderClients {
        card: None,
        mobile_gateway: Some(Arc::new(FakeGateway::default())),
    };
    let report = reconcile_with_provider(&pool, &clients, &[id], "ops")
        .await
        .unwrap();

    assert_eq!(report.errors, 1);
    assert_eq!(payment_by_id(&pool, id).await.status, "pending");
    let rows = webhooks_for(&pool, id).await;
    assert_eq!(
        rows[0].event_type.as_deref(),
        Some("admin.reconcile.provider.mobile-gateway-A.error")
    );
    assert_eq!(rows[0].raw_payload["response"], Value::Null);
}

// ── 6. unsupported_or_unconfigured_providers_are_noops ─────────────────────

#[tokio::test]
async fn unsupported_or_unconfigured_providers_are_noops() {
    let Some(pool) = setup_pool(DB).await else { return };
    let generic = seed_payment(
        &pool,
        SeedPayment::new("mobile-gateway-generic", "pending", &unique("mm")),
    )
    .await;
    let card = seed_payment(&pool, SeedPayment::new("card", "pending", &unique("pi"))).await;
    let mut no_ids = SeedPayment::new("mobile-gateway-A", "pending", "");
    no_ids.external_id = None;
    let gateway = seed_payment(&pool, no_ids).await;

    let clients = ProviderClients {
        card: None,
        mobile_gateway: Some(Arc::new(FakeGateway::default())),
    };
    let report = reconcile_with_provider(&pool, &clients, &[generic, card, gateway], "ops")
        .await
        .unwrap();
    assert_eq!(
        report,
        BatchReport {
            processed: 3,
            reconciled: 0,
            noop: 3,
            errors: 0,
        }
    );

    for id in [generic, card, gateway] {
        let rows = webhooks_for(&pool, id).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type.as_deref(), Some("admin.reconcile.noop"));
    }
    assert_eq!(
        webhooks_for(&pool, card).await[0].raw_payload["reason"],
        "provider-credentials-missing"
    );
}

// ── 7. reconcile_from_latest_audit_row ─────────────────────────────────────

#[tokio::test]
async fn reconcile_from_latest_audit_row() {
    let Some(pool) = setup_pool(DB).await else { return };
    let pi = unique("pi_audit");
    let id = seed_payment(&pool, SeedPayment::new("card", "pending", &pi)).await;

    // An earlier provider reconciliation left `inferred_status` behind.
    let clients = card_clients(FakeCard::default().answer(&pi, Ok(snapshot("succeeded", 5000))));
    reconcile_with_provider(&pool, &clients, &[id], "ops")
        .await
        .unwrap();
    sqlx::query("UPDATE payments SET status = 'pending' WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .unwrap();

    let report = reconcile_from_audit(&pool, &[id], "auditor").await.unwrap();
    assert_eq!(report.reconciled, 1);
    assert_eq!(payment_by_id(&pool, id).await.status, "succeeded");

    let rows = webhooks_for(&pool, id).await;
    let last = rows.last().unwrap();
    assert_eq!(last.event_type.as_deref(), Some("admin.reconcile.applied"));
    assert_eq!(last.raw_payload["inferred_status"], "succeeded");
    assert_eq!(last.raw_payload["admin"], "auditor");
    assert_eq!(last.raw_payload["from_webhook_id"], rows[0].id.to_string());
}

// ── 8. reconcile_from_audit_without_history_is_still_audited ───────────────

#[tokio::test]
async fn reconcile_from_audit_without_history_is_still_audited() {
    let Some(pool) = setup_pool(DB).await else { return };
    let id = seed_payment(&pool, SeedPayment::new("card", "pending", &unique("pi_new"))).await;

    let report = reconcile_from_audit(&pool, &[id], "auditor").await.unwrap();
    assert_eq!(report.noop, 1);

    let rows = webhooks_for(&pool, id).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].event_type.as_deref(), Some("admin.reconcile.requested"));
    assert_eq!(rows[0].raw_payload["note"], "no prior webhook found");
}

// ── 9. manual_marks_write_one_row_each ─────────────────────────────────────

#[tokio::test]
async fn manual_marks_write_one_row_each() {
    let Some(pool) = setup_pool(DB).await else { return };
    let pending = seed_payment(&pool, SeedPayment::new("card", "pending", &unique("pi_m"))).await;
    let refunded = seed_payment(&pool, SeedPayment::new("card", "refunded", &unique("pi_m"))).await;
    let unknown = Uuid::now_v7();

    let report = mark_status(
        &pool,
        &[pending, refunded, unknown, pending],
        ManualStatus::Refunded,
        "ops",
    )
    .await
    .unwrap();
    assert_eq!(
        report,
        BatchReport {
            processed: 2,
            reconciled: 1,
            noop: 1,
            errors: 0,
        }
    );

    let changed = webhooks_for(&pool, pending).await;
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].event_type.as_deref(), Some("admin.manual_status_update"));
    assert_eq!(changed[0].raw_payload, json!({"action": "mark_refunded", "admin": "ops"}));
    assert_eq!(payment_by_id(&pool, pending).await.status, "refunded");

    let untouched = webhooks_for(&pool, refunded).await;
    assert_eq!(
        untouched[0].event_type.as_deref(),
        Some("admin.manual_status_update.noop")
    );

    let report = mark_status(&pool, &[pending], ManualStatus::Failed, "ops")
        .await
        .unwrap();
    assert_eq!(report.reconciled, 1);
    assert_eq!(payment_by_id(&pool, pending).await.status, "failed");
}
