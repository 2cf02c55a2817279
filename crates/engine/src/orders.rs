//! Order normalization. Three payment channels with different success
//! statuses and amount conventions collapse into one canonical stream;
//! wallet packs and app-store products resolve against static catalogs
//! that are kept in sync with the storefront by code change.

use margin_core::types::{
    AppStoreOrderRow, CardOrderRow, Order, OrderChannel, WalletOrderRow,
};
use tracing::warn;

const CARD_SUCCESS_STATUS: &str = "succeeded";
const WALLET_SUCCESS_STATUS: &str = "completed";

/// Wallet energy-pack prices, keyed by pack id.
const WALLET_PACK_PRICES: &[(&str, f64)] = &[("500", 6.99), ("2000", 20.99)];

/// App-store product catalog. Unknown products resolve to zero and the
/// order is dropped.
const APP_STORE_CATALOG: &[(&str, f64)] = &[
    ("MEMBER_MONTHLY", 6.99),
    ("MEMBER_YEARLY", 58.99),
    ("BUILDER_MONTHLY", 59.99),
    ("BUILDER_YEARLY", 499.99),
    ("33OFF_BUILDER_MONTHLY", 39.99),
    ("energy_500", 6.99),
    ("energy_2000", 20.99),
];

fn wallet_pack_price(pack_id: &str) -> Option<f64> {
    WALLET_PACK_PRICES
        .iter()
        .find(|(id, _)| *id == pack_id)
        .map(|(_, price)| *price)
}

fn app_store_price(product_id: &str) -> f64 {
    APP_STORE_CATALOG
        .iter()
        .find(|(id, _)| *id == product_id)
        .map(|(_, price)| *price)
        .unwrap_or(0.0)
}

/// Lenient decimal parse: a malformed amount counts as zero for that field
/// and is logged, never aborts the run.
fn parse_amount(raw: &str, channel: OrderChannel) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => {
            warn!(%channel, amount = raw, "Malformed order amount, treated as zero");
            0.0
        }
    }
}

pub struct OrderNormalizer;

impl OrderNormalizer {
    /// Merge all channels into one order stream. Orders with non-positive
    /// resolved amounts are dropped; output ordering is not guaranteed.
    pub fn normalize(
        card: &[CardOrderRow],
        wallet: &[WalletOrderRow],
        app_store: &[AppStoreOrderRow],
    ) -> Vec<Order> {
        let mut orders = Vec::new();

        for row in card {
            if row.status != CARD_SUCCESS_STATUS {
                continue;
            }
            orders.push(Order {
                user_id: row.user_id,
                amount_usd: parse_amount(&row.amount, OrderChannel::Card),
                created_at: row.created_at,
                channel: OrderChannel::Card,
            });
        }

        for row in wallet {
            if row.status != WALLET_SUCCESS_STATUS {
                continue;
            }
            let mut amount = parse_amount(&row.amount, OrderChannel::Wallet);
            // Pack purchases carry a zero placeholder amount.
            if amount == 0.0 {
                if let Some(pack_id) = &row.pack_id {
                    amount = wallet_pack_price(pack_id).unwrap_or(0.0);
                }
            }
            orders.push(Order {
                user_id: row.user_id,
                amount_usd: amount,
                created_at: row.created_at,
                channel: OrderChannel::Wallet,
            });
        }

        for row in app_store {
            orders.push(Order {
                user_id: row.user_id,
                amount_usd: app_store_price(&row.product_id),
                created_at: row.created_at,
                channel: OrderChannel::AppStore,
            });
        }

        orders.retain(|o| o.amount_usd > 0.0);
        orders
    }
}
