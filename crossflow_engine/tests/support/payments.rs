use cfp_common::{Rate, Usd};
use chrono::{Duration, Utc};
use crossflow_engine::{
    db_types::{Corridor, FeeHandling, NewPayment, PaymentId, PaymentMethod},
    fees,
};

/// Builds a priced `NewPayment` the way the initiate endpoint does: fee snapshot from the fee engine, destination
/// figures derived from the given rate, a fresh 60-second quote window.
pub fn new_payment(user_id: &str, amount: Usd, method: PaymentMethod, corridor: Corridor, handling: FeeHandling) -> NewPayment {
    let summary = fees::calculate(amount, method, corridor, handling).expect("Fee calculation failed");
    let rate = test_rate(corridor);
    NewPayment {
        id: PaymentId::random(),
        user_id: user_id.to_string(),
        destination_currency: corridor,
        amount,
        payment_method: method,
        fee_handling: handling,
        onramp_fee: summary.fees.onramp,
        corridor_fee: summary.fees.corridor,
        platform_fee: summary.fees.platform,
        network_gas_fee: summary.fees.network_gas,
        total_fees: summary.fees.total,
        usdc_sent: summary.usdc_sent,
        exchange_rate: rate,
        destination_amount: rate.convert(summary.usdc_sent),
        quote_id: Some(uuid::Uuid::new_v4().to_string()),
        quote_expires_at: Utc::now() + Duration::seconds(60),
    }
}

pub fn test_rate(corridor: Corridor) -> Rate {
    crossflow_engine::providers::fallback_rate(corridor)
}
