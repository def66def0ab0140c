// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message bodies for customers and the vendor.
//!
//! Customer-facing text opens with a rotated phrase from the pool; the
//! builders here append the order specifics. Vendor text is terse and always
//! starts with the customer number so the vendor can answer with a command.

use chrono::{DateTime, Utc};
use vitrina_config::model::{SinpeConfig, StoreConfig};
use vitrina_core::{DeliveryMethod, Offer, PendingQuote, Session, SessionState};

use crate::intent::FaqTopic;
use crate::vendor::CHEAT_SHEET;

/// `12500` becomes `₡12,500`.
pub fn colones(amount: u64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("₡{grouped}")
}

pub fn catalog(links: &[String]) -> String {
    let mut body = String::from("Aquí está nuestro catálogo:");
    for link in links {
        body.push_str("\n👉 ");
        body.push_str(link);
    }
    body
}

/// Greeting reply, with the catalog appended when `include_catalog`.
pub fn greeting(intro: &str, ask_photo: &str, store: &StoreConfig, include_catalog: bool) -> String {
    let mut body = format!("{intro} Bienvenido a {}.\n{ask_photo}", store.name);
    if include_catalog && !store.catalog_links.is_empty() {
        body.push_str("\n\n");
        body.push_str(&catalog(&store.catalog_links));
    }
    body
}

pub fn quote_offer(intro: &str, offer: &Offer, store: &StoreConfig) -> String {
    let mut body = format!("{intro}\nPrecio: {}", colones(offer.price));
    if store.ships {
        if let Some(fee) = offer.shipping_fee {
            body.push_str(&format!(
                "\nEnvío: {} (total con envío {})",
                colones(fee),
                colones(offer.total(DeliveryMethod::Ship))
            ));
        }
    }
    body.push_str("\n¿Te interesa? Respondé *sí* o *no*.");
    body
}

/// The open quote again, for a customer who wrote something unrelated.
pub fn quote_recap(offer: &Offer, store: &StoreConfig) -> String {
    quote_offer("Te recuerdo la cotización:", offer, store)
}

pub fn choose_delivery(intro: &str, offer: &Offer) -> String {
    match offer.shipping_fee {
        Some(_) => format!(
            "{intro}\n1️⃣ Envío: {} en total\n2️⃣ Retiro: {}",
            colones(offer.total(DeliveryMethod::Ship)),
            colones(offer.total(DeliveryMethod::Pickup))
        ),
        None => intro.to_string(),
    }
}

pub fn ask_shipping(intro: &str, offer: &Offer) -> String {
    match offer.shipping_fee {
        Some(fee) => format!("{intro}\nEl envío tiene un costo de {}.", colones(fee)),
        None => intro.to_string(),
    }
}

pub fn ask_pickup(intro: &str, store: &StoreConfig) -> String {
    match &store.pickup_address {
        Some(address) => format!("{intro}\nNos encontrás en: {address}"),
        None => intro.to_string(),
    }
}

pub fn payment_instructions(intro: &str, total: u64, reference: &str, sinpe: &SinpeConfig) -> String {
    let mut body = format!("{intro}\nMonto: {}", colones(total));
    if let Some(number) = &sinpe.number {
        body.push_str(&format!("\nSINPE Móvil: {number}"));
        if let Some(holder) = &sinpe.holder {
            body.push_str(&format!(" ({holder})"));
        }
    }
    body.push_str(&format!(
        "\nEn el detalle escribí: {reference}\nCuando lo hagás, avisanos por aquí."
    ));
    body
}

pub fn payment_confirmed(intro: &str, session: &Session, store: &StoreConfig) -> String {
    match session.delivery_method {
        DeliveryMethod::Ship => match &session.shipping_details {
            Some(details) => format!("{intro}\nTe lo enviamos a:\n{details}"),
            None => format!("{intro}\nPronto te enviamos tu pedido."),
        },
        DeliveryMethod::Pickup => match &store.pickup_address {
            Some(address) => format!("{intro}\nTe esperamos en {address} para retirarlo."),
            None => format!("{intro}\nTe esperamos para que lo retirés."),
        },
        DeliveryMethod::None => intro.to_string(),
    }
}

pub fn reminder(intro: &str, offer: &Offer) -> String {
    format!("{intro}\nPrecio: {}. ¿Lo apartamos?", colones(offer.price))
}

/// Canned answer for a FAQ topic, if the store has one.
pub fn faq_answer(topic: FaqTopic, store: &StoreConfig, session: &Session) -> Option<String> {
    let faq = &store.faq;
    match topic {
        FaqTopic::Price => match (session.state, &session.last_offer) {
            (SessionState::QuoteSent, Some(offer)) => Some(quote_offer(
                "Te recuerdo la cotización:",
                offer,
                store,
            )),
            _ => faq.price.clone(),
        },
        FaqTopic::Stock => faq.stock.clone(),
        FaqTopic::Shipping => faq.shipping.clone().or_else(|| {
            Some(
                match (store.ships, store.pickup) {
                    (true, true) => "Hacemos envíos a todo el país y también podés retirar en tienda.",
                    (true, false) => "Hacemos envíos a todo el país.",
                    (false, _) => "Por ahora solo entregamos con retiro en tienda.",
                }
                .to_string(),
            )
        }),
        FaqTopic::Hours => faq.hours.clone(),
        FaqTopic::Location => faq
            .location
            .clone()
            .or_else(|| store.pickup_address.clone().map(|a| format!("Estamos en {a}."))),
        FaqTopic::PaymentMethods => faq.payment_methods.clone().or_else(|| {
            store
                .sinpe
                .number
                .as_ref()
                .map(|number| format!("Recibimos pagos por SINPE Móvil al {number}."))
        }),
        FaqTopic::Warranty => faq.warranty.clone(),
    }
}

/// System prompt used when the operator has not configured one.
pub fn default_system_prompt(store: &StoreConfig) -> String {
    let delivery = match (store.ships, store.pickup) {
        (true, true) => "envíos y retiro en tienda",
        (true, false) => "solo envíos",
        (false, _) => "solo retiro en tienda",
    };
    format!(
        "Sos el asistente de WhatsApp de {name}, una tienda en Costa Rica que ofrece {delivery}. \
Respondé en español costarricense, breve y amable (máximo 2 oraciones). \
Nunca inventés precios, disponibilidad ni plazos: para eso el cliente debe enviar una foto del producto. \
Respondé SOLO con JSON: {{\"action\": \"reply\" | \"ask_photo\" | \"handoff\", \"reply\": \"...\"}}. \
Usá \"ask_photo\" si conviene pedir la foto del producto y \"handoff\" si la pregunta necesita a una persona.",
        name = store.name,
    )
}

pub fn vendor_quote_request(customer_id: &str, details: &str) -> String {
    format!(
        "🛍️ Cotización {customer_id}\nDetalle: {details}\nRespondé: {customer_id} <precio> o {customer_id} <precio>-<envío> o {customer_id} 0"
    )
}

pub fn vendor_quote_sent(customer_id: &str, offer: &Offer) -> String {
    match offer.shipping_fee {
        Some(fee) => format!(
            "✔️ Cotización enviada a {customer_id}: {} + envío {}",
            colones(offer.price),
            colones(fee)
        ),
        None => format!(
            "✔️ Cotización enviada a {customer_id}: {}",
            colones(offer.price)
        ),
    }
}

pub fn vendor_purchase_intent(customer_id: &str, offer: &Offer, tokens_left: u64) -> String {
    format!(
        "🙌 {customer_id} quiere comprar ({}). Fichas restantes este mes: {tokens_left}",
        colones(offer.price)
    )
}

pub fn vendor_tokens_exhausted(customer_id: &str) -> String {
    format!(
        "⚠️ {customer_id} quiere comprar pero no quedan fichas este mes. Contactalo directamente o recargá fichas."
    )
}

pub fn vendor_payment_requested(
    customer_id: &str,
    method: DeliveryMethod,
    details: &str,
    total: u64,
    reference: &str,
) -> String {
    let method = match method {
        DeliveryMethod::Ship => "envío",
        DeliveryMethod::Pickup => "retiro",
        DeliveryMethod::None => "sin definir",
    };
    format!(
        "📦 Pedido {customer_id} ({method})\nDatos: {details}\nMonto: {}\nReferencia SINPE: {reference}\nAl recibir el pago: {customer_id} pagado",
        colones(total)
    )
}

pub fn vendor_payment_claim(customer_id: &str, total: u64, reference: &str) -> String {
    format!(
        "💸 {customer_id} dice que ya pagó {} (ref {reference}). Verificá y respondé: {customer_id} pagado",
        colones(total)
    )
}

pub fn vendor_receipt(customer_id: &str, total: u64, reference: &str) -> String {
    format!(
        "🧾 {customer_id} envió una imagen, posible comprobante de {} (ref {reference}). Si está bien: {customer_id} pagado",
        colones(total)
    )
}

pub fn vendor_sinpe_alert(customer_id: &str, total: u64, reference: &str) -> String {
    format!(
        "⏰ No se detectó automáticamente el SINPE de {customer_id} por {} (ref {reference}). Revisá manualmente y respondé: {customer_id} pagado",
        colones(total)
    )
}

pub fn vendor_payment_confirmed(customer_id: &str, total: u64, automatic: bool) -> String {
    let how = if automatic { " automáticamente" } else { "" };
    format!(
        "💰 Pago de {customer_id} por {} confirmado{how}.",
        colones(total)
    )
}

pub fn vendor_already_confirmed(customer_id: &str) -> String {
    format!("ℹ️ El pago de {customer_id} ya estaba confirmado.")
}

pub fn vendor_sinpe_unmatched() -> String {
    "❓ No pude asociar ese SINPE a ningún pedido pendiente. Confirmá con: <número> pagado".to_string()
}

pub fn vendor_sinpe_ambiguous(ids: &[String]) -> String {
    format!(
        "❓ Ese SINPE coincide con varios pedidos: {}. Confirmá con: <número> pagado",
        ids.join(", ")
    )
}

pub fn vendor_unknown_customer(customer_id: &str) -> String {
    format!("❌ No existe el cliente {customer_id}.")
}

pub fn vendor_rejected(customer_id: &str, action: &str, state: SessionState) -> String {
    format!("❌ No se aplicó {action} a {customer_id}: la conversación está en {state}.")
}

pub fn vendor_paused(customer_id: &str, paused: bool) -> String {
    if paused {
        format!("⏸️ Bot pausado para {customer_id}. Reanudá con: {customer_id} bot")
    } else {
        format!("▶️ Bot reanudado para {customer_id}.")
    }
}

pub fn vendor_catalog_sent(customer_id: &str) -> String {
    format!("📚 Catálogo enviado a {customer_id}.")
}

pub fn vendor_no_catalog() -> String {
    "❌ No hay enlaces de catálogo configurados.".to_string()
}

pub fn vendor_no_stock(customer_id: &str) -> String {
    format!("🚫 Avisamos a {customer_id} que no hay existencia.")
}

pub fn vendor_handoff(customer_id: &str, question: &str) -> String {
    format!("🙋 {customer_id} pregunta: \"{question}\"\nEl bot no pudo responder, escribile directamente.")
}

/// Pending quotes (oldest first) and the command cheat-sheet.
pub fn vendor_listing(quotes: &[PendingQuote], now: DateTime<Utc>) -> String {
    let mut body = if quotes.is_empty() {
        "No hay cotizaciones pendientes.".to_string()
    } else {
        let mut body = format!("Cotizaciones pendientes ({}):", quotes.len());
        for quote in quotes {
            let minutes = (now - quote.created_at).num_minutes().max(0);
            body.push_str(&format!(
                "\n• {} hace {minutes} min: {}",
                quote.customer_id, quote.details_text
            ));
        }
        body
    };
    body.push_str("\n\n");
    body.push_str(CHEAT_SHEET);
    body
}
