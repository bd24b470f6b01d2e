use std::time::Duration;

use metrics::{counter, histogram};
use tracing::{info, warn};

use super::metrics::prometheus_enabled;
use crate::codec::TermsLayout;
use crate::txn::TxId;

pub fn delegation_rejected(layout: TermsLayout, field: &'static str) {
    warn!(
        target: "monitoring::signer",
        event = "delegation_rejected",
        layout = ?layout,
        field,
        "委托凭证约束拦截"
    );

    if prometheus_enabled() {
        let layout_label = match layout {
            TermsLayout::Lender => "lender",
            TermsLayout::Dispenser => "dispenser",
        };
        counter!(
            "jina_delegation_rejected_total",
            "layout" => layout_label,
            "field" => field
        )
        .increment(1);
    }
}

pub fn delegation_issued(layout: TermsLayout, expiry_round: Option<u64>) {
    info!(
        target: "monitoring::signer",
        event = "delegation_issued",
        layout = ?layout,
        expiry_round = ?expiry_round,
        "委托凭证已签发"
    );

    if prometheus_enabled() {
        counter!("jina_delegation_issued_total").increment(1);
    }
}

pub fn simulation_verdict(operation: &str, passed: bool, members: usize, budget_consumed: u64) {
    if passed {
        info!(
            target: "monitoring::simulate",
            event = "simulation",
            operation,
            passed,
            members,
            budget_consumed,
            "模拟执行通过"
        );
    } else {
        warn!(
            target: "monitoring::simulate",
            event = "simulation",
            operation,
            passed,
            members,
            budget_consumed,
            "模拟执行未通过"
        );
    }

    if prometheus_enabled() {
        let verdict = if passed { "pass" } else { "reject" };
        counter!(
            "jina_simulation_total",
            "operation" => operation.to_string(),
            "verdict" => verdict
        )
        .increment(1);
        histogram!(
            "jina_simulation_budget_consumed",
            "operation" => operation.to_string()
        )
        .record(budget_consumed as f64);
    }
}

pub fn simulation_unavailable(operation: &str, reason: &str) {
    warn!(
        target: "monitoring::simulate",
        event = "simulation",
        operation,
        reason,
        "模拟不可用，跳过"
    );

    if prometheus_enabled() {
        counter!(
            "jina_simulation_total",
            "operation" => operation.to_string(),
            "verdict" => "unavailable"
        )
        .increment(1);
    }
}

pub fn submission_broadcast(operation: &str, tx_id: &TxId, members: usize) {
    info!(
        target: "monitoring::submit",
        event = "broadcast",
        operation,
        tx_id = %tx_id,
        members,
        "交易已广播"
    );

    if prometheus_enabled() {
        counter!(
            "jina_submission_broadcast_total",
            "operation" => operation.to_string()
        )
        .increment(1);
    }
}

pub fn submission_confirmed(
    operation: &str,
    tx_id: &TxId,
    round: u64,
    rounds_waited: u64,
    elapsed: Duration,
) {
    info!(
        target: "monitoring::submit",
        event = "confirmed",
        operation,
        tx_id = %tx_id,
        round,
        rounds_waited,
        elapsed_ms = elapsed.as_millis() as u64,
        "交易已确认"
    );

    if prometheus_enabled() {
        counter!(
            "jina_submission_total",
            "operation" => operation.to_string(),
            "result" => "confirmed"
        )
        .increment(1);
        histogram!(
            "jina_confirmation_rounds",
            "operation" => operation.to_string()
        )
        .record(rounds_waited as f64);
        histogram!(
            "jina_confirmation_latency_ms",
            "operation" => operation.to_string()
        )
        .record(elapsed.as_secs_f64() * 1_000.0);
    }
}

/// `result` 取值：`rejected`、`timeout`、`cancelled`。
pub fn submission_unresolved(
    operation: &str,
    tx_id: Option<&TxId>,
    result: &'static str,
    reason: &str,
) {
    warn!(
        target: "monitoring::submit",
        event = "unresolved",
        operation,
        tx_id = tx_id.map(|id| id.as_str()).unwrap_or("-"),
        result,
        reason,
        "交易未确认"
    );

    if prometheus_enabled() {
        counter!(
            "jina_submission_total",
            "operation" => operation.to_string(),
            "result" => result
        )
        .increment(1);
    }
}

pub fn operation_finished(operation: &str, outcome: &'static str, elapsed: Duration) {
    info!(
        target: "monitoring::ops",
        event = "operation",
        operation,
        outcome,
        elapsed_ms = elapsed.as_millis() as u64,
        "操作结束"
    );

    if prometheus_enabled() {
        counter!(
            "jina_operation_total",
            "operation" => operation.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!(
            "jina_operation_latency_ms",
            "operation" => operation.to_string()
        )
        .record(elapsed.as_secs_f64() * 1_000.0);
    }
}
