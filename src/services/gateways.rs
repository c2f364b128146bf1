use crate::{config::PaymentConfig, entities::payment::PaymentMethod};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::info;

type HmacSha256 = Hmac<Sha256>;

/// How a payment method reaches settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementMode {
    /// Collected on delivery; accepted the moment the record exists
    Immediate,
    /// Customer scans a locally generated QR/transfer reference and an
    /// operator (or callback) confirms receipt later
    QrTransfer,
    /// Third-party gateway round-trip with a settlement outcome
    Gateway,
}

impl PaymentMethod {
    pub fn settlement_mode(self) -> SettlementMode {
        match self {
            PaymentMethod::Cod => SettlementMode::Immediate,
            PaymentMethod::BankTransfer | PaymentMethod::Momo => SettlementMode::QrTransfer,
            PaymentMethod::ZaloPay | PaymentMethod::PayPal => SettlementMode::Gateway,
        }
    }
}

/// Terminal outcome of a gateway settlement attempt.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub success: bool,
    pub transaction_id: String,
    pub message: String,
}

/// Settlement seam. Real gateway integrations implement this; the
/// simulated gateway stands in for them with a timed round-trip and a
/// weighted random outcome.
#[async_trait]
pub trait Gateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn settle(&self, payment_code: &str, amount: Decimal) -> SettlementOutcome;
}

/// Simulated third-party gateway. The delay is a non-blocking
/// `tokio::time::sleep` standing in for the network round-trip;
/// dropping the future cancels it. Delay and success probability come
/// from configuration so tests can force either outcome with no wait.
pub struct SimulatedGateway {
    name: &'static str,
    delay: Duration,
    success_rate: f64,
}

impl SimulatedGateway {
    pub fn new(name: &'static str, config: &PaymentConfig) -> Self {
        Self {
            name,
            delay: Duration::from_millis(config.gateway_delay_ms),
            success_rate: config.gateway_success_rate.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl Gateway for SimulatedGateway {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn settle(&self, payment_code: &str, amount: Decimal) -> SettlementOutcome {
        info!(gateway = self.name, payment_code, %amount, "settlement round-trip started");
        tokio::time::sleep(self.delay).await;

        let success = rand::thread_rng().gen_bool(self.success_rate);
        let transaction_id = generate_transaction_id(self.name);

        SettlementOutcome {
            success,
            message: if success {
                format!("{} settlement approved", self.name)
            } else {
                format!("{} settlement declined", self.name)
            },
            transaction_id,
        }
    }
}

/// Returns the gateway for a method, or `None` for methods that settle
/// without an external round-trip.
pub fn gateway_for(method: PaymentMethod, config: &PaymentConfig) -> Option<SimulatedGateway> {
    match method {
        PaymentMethod::ZaloPay => Some(SimulatedGateway::new("zalopay", config)),
        PaymentMethod::PayPal => Some(SimulatedGateway::new("paypal", config)),
        PaymentMethod::Cod | PaymentMethod::BankTransfer | PaymentMethod::Momo => None,
    }
}

/// Inbound callback payload from a gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub payment_code: String,
    pub transaction_id: String,
    pub status: String,
    pub signature: String,
}

/// Computes the callback signature: HMAC-SHA256 over
/// `payment_code|transaction_id|status`, hex encoded.
pub fn sign_callback(
    secret: &str,
    payment_code: &str,
    transaction_id: &str,
    status: &str,
) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(format!("{}|{}|{}", payment_code, transaction_id, status).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a callback signature in constant time.
pub fn verify_callback(secret: &str, payload: &CallbackPayload) -> bool {
    let expected = sign_callback(
        secret,
        &payload.payment_code,
        &payload.transaction_id,
        &payload.status,
    );
    constant_time_eq(&expected, &payload.signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Generates a merchant-side payment reference, e.g. `PAY-9F2K7Q3M1D`.
pub fn generate_payment_code() -> String {
    format!("PAY-{}", random_token(10))
}

/// Generates a QR/transfer reference for QR-based methods.
pub fn generate_qr_reference(method: PaymentMethod) -> String {
    format!("QR-{}-{}", method.to_string().to_uppercase(), random_token(8))
}

fn generate_transaction_id(gateway: &str) -> String {
    format!("{}-{}", gateway.to_uppercase(), random_token(12))
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
