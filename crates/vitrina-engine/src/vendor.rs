// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vendor command parsing.
//!
//! The vendor answers with short commands of the form
//! `<customer phone> <keyword or price>`, for example `50688881234 12500-2500`
//! or `50688881234 pagado`. Anything else is not a command.

use std::fmt;

/// Customer ids shorter than this are rejected as typos.
const MIN_CUSTOMER_DIGITS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorAction {
    ConfirmPayment,
    NoStock,
    Pause,
    Resume,
    SendCatalog,
    SetPrice { price: u64, shipping_fee: Option<u64> },
}

impl fmt::Display for VendorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfirmPayment => write!(f, "confirm_payment"),
            Self::NoStock => write!(f, "no_stock"),
            Self::Pause => write!(f, "pause"),
            Self::Resume => write!(f, "resume"),
            Self::SendCatalog => write!(f, "send_catalog"),
            Self::SetPrice { .. } => write!(f, "set_price"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorCommand {
    pub customer_id: String,
    pub action: VendorAction,
}

/// Parses one vendor message. Returns `None` for anything that is not a
/// well-formed command.
pub fn parse(text: &str) -> Option<VendorCommand> {
    let mut tokens = text.split_whitespace();
    let customer_id: String = tokens
        .next()?
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if customer_id.len() < MIN_CUSTOMER_DIGITS {
        return None;
    }

    let second = tokens.next()?;
    let action = keyword_action(&second.to_lowercase()).or_else(|| price_action(second))?;
    Some(VendorCommand {
        customer_id,
        action,
    })
}

fn keyword_action(keyword: &str) -> Option<VendorAction> {
    let action = match keyword {
        "pagado" | "pago" | "pagó" | "ok" => VendorAction::ConfirmPayment,
        "0" | "no" | "nohay" | "agotado" => VendorAction::NoStock,
        "pausa" | "pausar" | "stop" | "humano" => VendorAction::Pause,
        "bot" | "reanudar" | "activar" | "seguir" => VendorAction::Resume,
        "cat" | "catalogo" | "catálogo" => VendorAction::SendCatalog,
        _ => return None,
    };
    Some(action)
}

/// `12500`, `12.500`, `₡12,500-2500`: everything but digits and `-` is
/// dropped, then the part before the first `-` is the price and the part
/// after it the shipping fee. Amounts whose sum does not fit in a `u64` are
/// not a price.
fn price_action(token: &str) -> Option<VendorAction> {
    let cleaned: String = token
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    let (price, fee) = match cleaned.split_once('-') {
        Some((price, fee)) => (price, Some(fee)),
        None => (cleaned.as_str(), None),
    };

    let price: u64 = price.parse().ok().filter(|p| *p > 0)?;
    let shipping_fee = fee
        .and_then(|f| f.parse::<u64>().ok())
        .filter(|f| *f > 0);
    price.checked_add(shipping_fee.unwrap_or(0))?;
    Some(VendorAction::SetPrice {
        price,
        shipping_fee,
    })
}

/// Short reminder of the command syntax, sent with the pending-quote listing.
pub const CHEAT_SHEET: &str = "Comandos:\n\
• <número> <precio>  (ej. 50688881234 12500)\n\
• <número> <precio>-<envío>  (ej. 50688881234 12500-2500)\n\
• <número> 0  (no hay)\n\
• <número> pagado\n\
• <número> pausa | bot\n\
• <número> cat";
