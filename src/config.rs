//! 設定の読み込み
//!
//! 組み込みの既定値に`config/default.toml`、`config/{RUN_MODE}.toml`、
//! `LEDGER__`で始まる環境変数の順に重ねる。`DATABASE_URL`と`PORT`は最後に上書きする。

use crate::domain::{FinePolicy, LendingPolicy, Role, UserId};
use chrono::Duration;
use config::{Config, ConfigError, Environment, File, builder::DefaultState};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use uuid::Uuid;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// 未設定ならインメモリの台帳で動く
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LendingConfig {
    pub loan_period_days: i64,
    pub max_active_loans: usize,
    pub max_renewals: u8,
    pub blocking_fine_threshold: Option<Decimal>,
    pub lost_replacement_fee: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FinesConfig {
    pub grace_period_days: i64,
    pub daily_rate: Decimal,
    pub max_fine: Decimal,
}

/// 認可サービスに登録する利用者と役割（利用者ID → 役割）
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthorizationConfig {
    #[serde(default)]
    pub roles: HashMap<String, Role>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub lending: LendingConfig,
    pub fines: FinesConfig,
    #[serde(default)]
    pub authorization: AuthorizationConfig,
}

impl AppConfig {
    /// 設定ファイルと環境変数から読み込む
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("LEDGER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .set_override_option("server.port", env::var("PORT").ok())?
            .build()?;

        let app_config: Self = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// 組み込みの既定値
    ///
    /// 金額は文字列で与え、`Decimal`として読む。
    pub fn defaults() -> Result<config::ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.max_connections", 5)?
            .set_default("lending.loan_period_days", 14)?
            .set_default("lending.max_active_loans", 5)?
            .set_default("lending.max_renewals", 1)?
            .set_default("lending.blocking_fine_threshold", "100")?
            .set_default("lending.lost_replacement_fee", "500")?
            .set_default("fines.grace_period_days", 0)?
            .set_default("fines.daily_rate", "5")?
            .set_default("fines.max_fine", "100")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.lending.loan_period_days <= 0 {
            return Err(ConfigError::Message(
                "lending.loan_period_days must be positive".into(),
            ));
        }
        if self.fines.grace_period_days < 0 {
            return Err(ConfigError::Message(
                "fines.grace_period_days must not be negative".into(),
            ));
        }
        if self.fines.daily_rate.is_sign_negative() || self.fines.max_fine.is_sign_negative() {
            return Err(ConfigError::Message(
                "fines.daily_rate and fines.max_fine must not be negative".into(),
            ));
        }
        if self.lending.lost_replacement_fee.is_sign_negative() {
            return Err(ConfigError::Message(
                "lending.lost_replacement_fee must not be negative".into(),
            ));
        }
        self.user_roles()?;
        Ok(())
    }

    /// 設定された利用者と役割
    pub fn user_roles(&self) -> Result<Vec<(UserId, Role)>, ConfigError> {
        self.authorization
            .roles
            .iter()
            .map(|(user_id, role)| {
                Uuid::parse_str(user_id)
                    .map(|uuid| (UserId::from_uuid(uuid), *role))
                    .map_err(|_| {
                        ConfigError::Message(format!(
                            "authorization.roles: invalid user id {}",
                            user_id
                        ))
                    })
            })
            .collect()
    }

    pub fn lending_policy(&self) -> LendingPolicy {
        LendingPolicy {
            loan_period: Duration::days(self.lending.loan_period_days),
            max_active_loans: self.lending.max_active_loans,
            max_renewals: self.lending.max_renewals,
            blocking_fine_threshold: self.lending.blocking_fine_threshold,
            lost_replacement_fee: self.lending.lost_replacement_fee,
        }
    }

    pub fn fine_policy(&self) -> FinePolicy {
        FinePolicy {
            grace_period: Duration::days(self.fines.grace_period_days),
            daily_rate: self.fines.daily_rate,
            max_fine: self.fines.max_fine,
        }
    }
}
