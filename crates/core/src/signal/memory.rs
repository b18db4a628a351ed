//! 基于内存的 `SignalStore` 测试替身，语义与 SQLite 适配器的
//! 条件更新保持一致，供各 crate 的单元/集成测试注入。

use super::entity::{NewSignal, SignalPattern, SignalRecord, SignalStatus};
use super::error::StoreError;
use super::port::{CloseUpdate, ExcursionUpdate, OpenUpdate, SignalStore};
use crate::common::{SignalType, normalize_symbol};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// # Summary
/// 内存版信号存储。所有条件转移在单个写锁临界区内完成，
/// 与 SQLite 实现的原子条件 UPDATE 等价。
#[derive(Default)]
pub struct MemorySignalStore {
    rows: RwLock<HashMap<String, SignalRecord>>,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接植入一行记录 (测试前置状态构造)
    pub async fn seed(&self, record: SignalRecord) {
        self.rows
            .write()
            .await
            .insert(record.signal_id.clone(), record);
    }
}

/// 由创建载荷构造一行 pending 记录
pub fn pending_record(signal_id: &str, signal: &NewSignal, now: DateTime<Utc>) -> SignalRecord {
    SignalRecord {
        signal_id: signal_id.to_string(),
        symbol: normalize_symbol(&signal.symbol),
        signal_type: signal.signal_type,
        confluence_score: signal.confluence_score,
        reliability: signal.reliability,
        entry_price: signal.entry_price,
        stop_loss: signal.stop_loss,
        created_at: now,
        status: SignalStatus::Pending,
        confirmed_price: None,
        opened_at: None,
        closed_at: None,
        exit_price: None,
        exit_reason: None,
        outcome: None,
        pnl_pct: None,
        r_multiple: None,
        duration_hours: None,
        performance_notes: None,
        mfe_pct: None,
        mfe_price: None,
        mfe_at: None,
        mae_pct: None,
        mae_price: None,
        mae_at: None,
        signal_pattern: None,
        divergence_type: None,
        orderflow_tags: Vec::new(),
        trigger_component: None,
        is_validation_cohort: false,
        orderflow_config: None,
        targets: signal.targets.clone(),
        components: signal.components.clone(),
        trade_params: signal.trade_params.clone(),
        report_json_path: signal.report_json_path.clone(),
        report_pdf_path: signal.report_pdf_path.clone(),
        sent: signal.sent,
    }
}

#[async_trait]
impl SignalStore for MemorySignalStore {
    async fn create(&self, signal: &NewSignal) -> Result<Option<String>, StoreError> {
        let symbol = normalize_symbol(&signal.symbol);
        let now = Utc::now();
        let signal_id = format!(
            "SIG-{}-{}-{:.0}-{}",
            symbol,
            signal.signal_type,
            signal.confluence_score.round(),
            now.format("%Y%m%d%H%M%S")
        );

        let mut rows = self.rows.write().await;
        if rows.contains_key(&signal_id) {
            return Ok(None);
        }
        rows.insert(signal_id.clone(), pending_record(&signal_id, signal, now));
        Ok(Some(signal_id))
    }

    async fn get(&self, signal_id: &str) -> Result<Option<SignalRecord>, StoreError> {
        Ok(self.rows.read().await.get(signal_id).cloned())
    }

    async fn list_recent(
        &self,
        limit: u32,
        symbol: Option<&str>,
        signal_type: Option<SignalType>,
    ) -> Result<Vec<SignalRecord>, StoreError> {
        let symbol = symbol.map(normalize_symbol);
        let mut rows: Vec<SignalRecord> = self
            .rows
            .read()
            .await
            .values()
            .filter(|r| symbol.as_ref().is_none_or(|s| r.symbol == *s))
            .filter(|r| signal_type.is_none_or(|t| r.signal_type == t))
            .cloned()
            .collect();
        rows.sort_by_key(|r| std::cmp::Reverse(r.created_at));
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }

    async fn list_active(&self) -> Result<Vec<SignalRecord>, StoreError> {
        let mut rows: Vec<SignalRecord> = self
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.status == SignalStatus::Active)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.opened_at);
        Ok(rows)
    }

    async fn mark_opened(
        &self,
        signal_id: &str,
        update: &OpenUpdate,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(signal_id) else {
            return Ok(false);
        };
        if row.status != SignalStatus::Pending {
            return Ok(false);
        }

        row.status = SignalStatus::Active;
        row.opened_at = Some(update.opened_at);
        if update.confirmed_price.is_some() {
            row.confirmed_price = update.confirmed_price;
        }
        if update.signal_pattern.is_some() {
            row.signal_pattern = update.signal_pattern;
        }
        if update.divergence_type.is_some() {
            row.divergence_type = update.divergence_type;
        }
        if let Some(tags) = &update.orderflow_tags {
            row.orderflow_tags = tags.clone();
        }
        if update.trigger_component.is_some() {
            row.trigger_component = update.trigger_component.clone();
        }
        if let Some(cohort) = update.is_validation_cohort {
            row.is_validation_cohort = cohort;
        }
        if update.orderflow_config.is_some() {
            row.orderflow_config = update.orderflow_config.clone();
        }
        Ok(true)
    }

    async fn apply_excursion(
        &self,
        signal_id: &str,
        update: &ExcursionUpdate,
    ) -> Result<bool, StoreError> {
        if update.is_empty() {
            return Ok(false);
        }
        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(signal_id) else {
            return Ok(false);
        };
        if row.status != SignalStatus::Active {
            return Ok(false);
        }

        if let Some((pct, price, at)) = update.mfe {
            row.mfe_pct = Some(pct);
            row.mfe_price = Some(price);
            row.mfe_at = Some(at);
        }
        if let Some((pct, price, at)) = update.mae {
            row.mae_pct = Some(pct);
            row.mae_price = Some(price);
            row.mae_at = Some(at);
        }
        Ok(true)
    }

    async fn mark_closed(
        &self,
        signal_id: &str,
        update: &CloseUpdate,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(signal_id) else {
            return Ok(false);
        };
        if row.status == SignalStatus::Closed {
            return Ok(false);
        }

        row.status = SignalStatus::Closed;
        row.closed_at = Some(update.closed_at);
        row.exit_price = Some(update.exit_price);
        row.exit_reason = Some(update.exit_reason);
        row.outcome = Some(update.outcome);
        row.pnl_pct = Some(update.pnl_pct);
        row.r_multiple = update.r_multiple;
        row.duration_hours = update.duration_hours;
        if update.performance_notes.is_some() {
            row.performance_notes = update.performance_notes.clone();
        }
        Ok(true)
    }

    async fn list_closed_since(
        &self,
        cutoff: DateTime<Utc>,
        signal_type: Option<SignalType>,
        pattern: Option<SignalPattern>,
    ) -> Result<Vec<SignalRecord>, StoreError> {
        use super::entity::Outcome;

        let rows: Vec<SignalRecord> = self
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.status == SignalStatus::Closed)
            .filter(|r| {
                matches!(
                    r.outcome,
                    Some(Outcome::Win) | Some(Outcome::Loss) | Some(Outcome::StoppedOut)
                )
            })
            .filter(|r| r.closed_at.is_some_and(|c| c >= cutoff))
            .filter(|r| signal_type.is_none_or(|t| r.signal_type == t))
            .filter(|r| pattern.is_none_or(|p| r.signal_pattern == Some(p)))
            .cloned()
            .collect();
        Ok(rows)
    }
}
