use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use shingo_core::common::{SignalType, normalize_symbol};
use shingo_core::signal::entity::{
    NewSignal, OrderflowTag, SignalPattern, SignalRecord, SignalStatus, Target,
};
use shingo_core::signal::error::StoreError;
use shingo_core::signal::port::{CloseUpdate, ExcursionUpdate, OpenUpdate, SignalStore};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::fs;
use std::str::FromStr;
use tracing::{error, info};

/// 默认信号数据库文件名
const DEFAULT_SIGNAL_DB: &str = "signals.db";

/// # Summary
/// `SignalStore` 的 SQLite 实现，在中心化的 `signals.db` 中
/// 维护唯一的 `trading_signals` 表。表中的行即是系统的权威状态，
/// 监控循环与 API 层并发读取同一张表。
///
/// # Invariants
/// * 表结构在存储实例创建时初始化。
/// * 所有状态转移通过原子的条件 UPDATE 执行，绝不做先读后写。
pub struct SqliteSignalStore {
    pool: SqlitePool,
}

impl SqliteSignalStore {
    /// 创建新的 SqliteSignalStore 并初始化表结构。
    ///
    /// # Logic
    /// 1. 获取配置的数据根目录并确保其存在。
    /// 2. 配置 SQLite 连接选项：`create_if_missing` + WAL + busy_timeout。
    /// 3. 连接到数据库并执行 DDL 初始化 `trading_signals` 表。
    ///
    /// # Returns
    /// * `Result<Self, StoreError>` - 存储实例 or 数据库错误。
    pub async fn new() -> Result<Self, StoreError> {
        let root = crate::config::get_root_dir();
        fs::create_dir_all(&root).map_err(|e| StoreError::InitError(e.to_string()))?;

        let db_path = root.join(DEFAULT_SIGNAL_DB);
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| StoreError::InitError(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trading_signals (
                signal_id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                signal_type TEXT NOT NULL,
                confluence_score REAL NOT NULL,
                reliability REAL NOT NULL,
                entry_price REAL,
                stop_loss REAL,
                created_at DATETIME NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                confirmed_price REAL,
                opened_at DATETIME,
                closed_at DATETIME,
                exit_price REAL,
                exit_reason TEXT,
                outcome TEXT,
                pnl_pct REAL,
                r_multiple REAL,
                duration_hours REAL,
                performance_notes TEXT,
                mfe_pct REAL,
                mfe_price REAL,
                mfe_at DATETIME,
                mae_pct REAL,
                mae_price REAL,
                mae_at DATETIME,
                signal_pattern TEXT,
                divergence_type TEXT,
                orderflow_tags TEXT NOT NULL DEFAULT '[]',
                trigger_component TEXT,
                is_validation_cohort INTEGER NOT NULL DEFAULT 0,
                orderflow_config TEXT,
                targets TEXT NOT NULL DEFAULT '[]',
                components TEXT NOT NULL DEFAULT 'null',
                trade_params TEXT NOT NULL DEFAULT 'null',
                report_json_path TEXT,
                report_pdf_path TEXT,
                sent INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_signals_status
                ON trading_signals (status);
            CREATE INDEX IF NOT EXISTS idx_signals_created_at
                ON trading_signals (created_at);
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::InitError(e.to_string()))?;

        Ok(Self { pool })
    }

    /// # Summary
    /// 由 (symbol, 方向, 取整评分, 秒级时间戳) 派生确定性信号 ID。
    /// 同一秒内同参数的重复创建得到同一个 ID，作为粗粒度的幂等键。
    fn derive_signal_id(
        symbol: &str,
        signal_type: SignalType,
        score: f64,
        now: DateTime<Utc>,
    ) -> String {
        format!(
            "SIG-{}-{}-{:.0}-{}",
            symbol,
            signal_type,
            score.round(),
            now.format("%Y%m%d%H%M%S")
        )
    }
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_json<T: DeserializeOwned>(text: &str, field: &str) -> Result<T, StoreError> {
    serde_json::from_str(text)
        .map_err(|e| StoreError::Serialization(format!("{}: {}", field, e)))
}

fn parse_wire<T: FromStr<Err = String>>(text: Option<String>) -> Result<Option<T>, StoreError> {
    text.map(|t| t.parse::<T>().map_err(StoreError::Serialization))
        .transpose()
}

/// 将一行数据库记录还原为领域实体，逆转所有文本编码。
fn row_to_record(row: &SqliteRow) -> Result<SignalRecord, StoreError> {
    let db = |e: sqlx::Error| StoreError::Database(e.to_string());

    let signal_type: String = row.try_get("signal_type").map_err(db)?;
    let status: String = row.try_get("status").map_err(db)?;
    let tags_text: String = row.try_get("orderflow_tags").map_err(db)?;
    let targets_text: String = row.try_get("targets").map_err(db)?;
    let components_text: String = row.try_get("components").map_err(db)?;
    let trade_params_text: String = row.try_get("trade_params").map_err(db)?;

    let orderflow_tags: Vec<OrderflowTag> = decode_json(&tags_text, "orderflow_tags")?;
    let targets: Vec<Target> = decode_json(&targets_text, "targets")?;

    Ok(SignalRecord {
        signal_id: row.try_get("signal_id").map_err(db)?,
        symbol: row.try_get("symbol").map_err(db)?,
        signal_type: signal_type
            .parse::<SignalType>()
            .map_err(StoreError::Serialization)?,
        confluence_score: row.try_get("confluence_score").map_err(db)?,
        reliability: row.try_get("reliability").map_err(db)?,
        entry_price: row.try_get("entry_price").map_err(db)?,
        stop_loss: row.try_get("stop_loss").map_err(db)?,
        created_at: row.try_get("created_at").map_err(db)?,
        status: status
            .parse::<SignalStatus>()
            .map_err(StoreError::Serialization)?,
        confirmed_price: row.try_get("confirmed_price").map_err(db)?,
        opened_at: row.try_get("opened_at").map_err(db)?,
        closed_at: row.try_get("closed_at").map_err(db)?,
        exit_price: row.try_get("exit_price").map_err(db)?,
        exit_reason: parse_wire(row.try_get("exit_reason").map_err(db)?)?,
        outcome: parse_wire(row.try_get("outcome").map_err(db)?)?,
        pnl_pct: row.try_get("pnl_pct").map_err(db)?,
        r_multiple: row.try_get("r_multiple").map_err(db)?,
        duration_hours: row.try_get("duration_hours").map_err(db)?,
        performance_notes: row.try_get("performance_notes").map_err(db)?,
        mfe_pct: row.try_get("mfe_pct").map_err(db)?,
        mfe_price: row.try_get("mfe_price").map_err(db)?,
        mfe_at: row.try_get("mfe_at").map_err(db)?,
        mae_pct: row.try_get("mae_pct").map_err(db)?,
        mae_price: row.try_get("mae_price").map_err(db)?,
        mae_at: row.try_get("mae_at").map_err(db)?,
        signal_pattern: parse_wire(row.try_get("signal_pattern").map_err(db)?)?,
        divergence_type: parse_wire(row.try_get("divergence_type").map_err(db)?)?,
        orderflow_tags,
        trigger_component: row.try_get("trigger_component").map_err(db)?,
        is_validation_cohort: row.try_get("is_validation_cohort").map_err(db)?,
        orderflow_config: row.try_get("orderflow_config").map_err(db)?,
        targets,
        components: decode_json(&components_text, "components")?,
        trade_params: decode_json(&trade_params_text, "trade_params")?,
        report_json_path: row.try_get("report_json_path").map_err(db)?,
        report_pdf_path: row.try_get("report_pdf_path").map_err(db)?,
        sent: row.try_get("sent").map_err(db)?,
    })
}

#[async_trait]
impl SignalStore for SqliteSignalStore {
    /// # Summary
    /// 幂等插入一行新信号。
    ///
    /// # Logic
    /// 1. 归一化 symbol，派生确定性 ID。
    /// 2. `INSERT OR IGNORE` 写入静态属性与不透明载荷。
    /// 3. `rows_affected == 0` 说明同秒重复创建，返回 `None`。
    async fn create(&self, signal: &NewSignal) -> Result<Option<String>, StoreError> {
        let symbol = normalize_symbol(&signal.symbol);
        let now = Utc::now();
        let signal_id =
            Self::derive_signal_id(&symbol, signal.signal_type, signal.confluence_score, now);

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO trading_signals (
                signal_id, symbol, signal_type, confluence_score, reliability,
                entry_price, stop_loss, created_at, status,
                targets, components, trade_params,
                report_json_path, report_pdf_path, sent
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&signal_id)
        .bind(&symbol)
        .bind(signal.signal_type.to_string())
        .bind(signal.confluence_score)
        .bind(signal.reliability)
        .bind(signal.entry_price)
        .bind(signal.stop_loss)
        .bind(now)
        .bind(encode_json(&signal.targets)?)
        .bind(encode_json(&signal.components)?)
        .bind(encode_json(&signal.trade_params)?)
        .bind(&signal.report_json_path)
        .bind(&signal.report_pdf_path)
        .bind(signal.sent)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to insert signal {}: {}", signal_id, e);
            StoreError::Database(e.to_string())
        })?;

        if result.rows_affected() == 0 {
            // 同秒内的重复创建，按至多一次语义静默吸收
            info!("Duplicate signal suppressed: {}", signal_id);
            return Ok(None);
        }

        info!("Stored new signal {}", signal_id);
        Ok(Some(signal_id))
    }

    async fn get(&self, signal_id: &str) -> Result<Option<SignalRecord>, StoreError> {
        sqlx::query("SELECT * FROM trading_signals WHERE signal_id = ?")
            .bind(signal_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|row| row_to_record(&row))
            .transpose()
    }

    async fn list_recent(
        &self,
        limit: u32,
        symbol: Option<&str>,
        signal_type: Option<SignalType>,
    ) -> Result<Vec<SignalRecord>, StoreError> {
        let symbol = symbol.map(normalize_symbol);
        let rows = sqlx::query(
            r#"
            SELECT * FROM trading_signals
            WHERE (? IS NULL OR symbol = ?)
              AND (? IS NULL OR signal_type = ?)
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(&symbol)
        .bind(&symbol)
        .bind(signal_type.map(|t| t.to_string()))
        .bind(signal_type.map(|t| t.to_string()))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.iter().map(row_to_record).collect()
    }

    async fn list_active(&self) -> Result<Vec<SignalRecord>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM trading_signals WHERE status = 'active' ORDER BY opened_at")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.iter().map(row_to_record).collect()
    }

    /// # Summary
    /// 条件入场转移。未提供的分类字段通过 COALESCE 保持原值 (部分更新)。
    async fn mark_opened(
        &self,
        signal_id: &str,
        update: &OpenUpdate,
    ) -> Result<bool, StoreError> {
        let tags_json = update
            .orderflow_tags
            .as_ref()
            .map(encode_json)
            .transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE trading_signals SET
                status = 'active',
                opened_at = ?,
                confirmed_price = COALESCE(?, confirmed_price),
                signal_pattern = COALESCE(?, signal_pattern),
                divergence_type = COALESCE(?, divergence_type),
                orderflow_tags = COALESCE(?, orderflow_tags),
                trigger_component = COALESCE(?, trigger_component),
                is_validation_cohort = COALESCE(?, is_validation_cohort),
                orderflow_config = COALESCE(?, orderflow_config)
            WHERE signal_id = ? AND status = 'pending'
            "#,
        )
        .bind(update.opened_at)
        .bind(update.confirmed_price)
        .bind(update.signal_pattern.map(|p| p.to_string()))
        .bind(update.divergence_type.map(|d| d.to_string()))
        .bind(tags_json)
        .bind(&update.trigger_component)
        .bind(update.is_validation_cohort)
        .bind(&update.orderflow_config)
        .bind(signal_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// # Summary
    /// 条件超额偏移写入，只写实际被突破的一侧。
    async fn apply_excursion(
        &self,
        signal_id: &str,
        update: &ExcursionUpdate,
    ) -> Result<bool, StoreError> {
        if update.is_empty() {
            return Ok(false);
        }

        let (mfe_pct, mfe_price, mfe_at) = match update.mfe {
            Some((pct, price, at)) => (Some(pct), Some(price), Some(at)),
            None => (None, None, None),
        };
        let (mae_pct, mae_price, mae_at) = match update.mae {
            Some((pct, price, at)) => (Some(pct), Some(price), Some(at)),
            None => (None, None, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE trading_signals SET
                mfe_pct = COALESCE(?, mfe_pct),
                mfe_price = COALESCE(?, mfe_price),
                mfe_at = COALESCE(?, mfe_at),
                mae_pct = COALESCE(?, mae_pct),
                mae_price = COALESCE(?, mae_price),
                mae_at = COALESCE(?, mae_at)
            WHERE signal_id = ? AND status = 'active'
            "#,
        )
        .bind(mfe_pct)
        .bind(mfe_price)
        .bind(mfe_at)
        .bind(mae_pct)
        .bind(mae_price)
        .bind(mae_at)
        .bind(signal_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// # Summary
    /// 条件平仓转移。`status != 'closed'` 的守卫保证重复平仓与
    /// 并发平仓的后到者拿到 `false`，而不是覆盖已计算的结局字段。
    async fn mark_closed(
        &self,
        signal_id: &str,
        update: &CloseUpdate,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE trading_signals SET
                status = 'closed',
                closed_at = ?,
                exit_price = ?,
                exit_reason = ?,
                outcome = ?,
                pnl_pct = ?,
                r_multiple = ?,
                duration_hours = ?,
                performance_notes = COALESCE(?, performance_notes)
            WHERE signal_id = ? AND status != 'closed'
            "#,
        )
        .bind(update.closed_at)
        .bind(update.exit_price)
        .bind(update.exit_reason.to_string())
        .bind(update.outcome.to_string())
        .bind(update.pnl_pct)
        .bind(update.r_multiple)
        .bind(update.duration_hours)
        .bind(&update.performance_notes)
        .bind(signal_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_closed_since(
        &self,
        cutoff: DateTime<Utc>,
        signal_type: Option<SignalType>,
        pattern: Option<SignalPattern>,
    ) -> Result<Vec<SignalRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM trading_signals
            WHERE status = 'closed'
              AND outcome IN ('win', 'loss', 'stopped_out')
              AND closed_at >= ?
              AND (? IS NULL OR signal_type = ?)
              AND (? IS NULL OR signal_pattern = ?)
            ORDER BY closed_at DESC
            "#,
        )
        .bind(cutoff)
        .bind(signal_type.map(|t| t.to_string()))
        .bind(signal_type.map(|t| t.to_string()))
        .bind(pattern.map(|p| p.to_string()))
        .bind(pattern.map(|p| p.to_string()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.iter().map(row_to_record).collect()
    }
}
