// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword intent detection over normalized Spanish text.
//!
//! Every detector expects the output of [`normalize`]: lowercase, accents
//! stripped, punctuation turned into spaces, whitespace collapsed.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;
use vitrina_core::DeliveryMethod;

/// Greetings (prefix match).
const GREETINGS: &[&str] = &[
    "hola",
    "holi",
    "buenas",
    "buenos dias",
    "buen dia",
    "buenas tardes",
    "buenas noches",
    "saludos",
    "que tal",
    "pura vida",
    "hey",
    "hi",
    "hello",
];

/// Purchase confirmations (prefix match).
const YES_WORDS: &[&str] = &[
    "si",
    "sii",
    "sip",
    "claro",
    "dale",
    "de una",
    "ok",
    "okay",
    "va",
    "listo",
    "perfecto",
    "me interesa",
    "lo quiero",
    "la quiero",
    "los quiero",
    "las quiero",
    "quiero",
    "me lo llevo",
    "me la llevo",
    "por supuesto",
    "yes",
];

/// Purchase refusals (prefix match).
const NO_WORDS: &[&str] = &[
    "no",
    "nop",
    "nel",
    "mejor no",
    "ya no",
    "gracias no",
    "paso",
    "muy caro",
    "esta caro",
];

/// Messages longer than this are never treated as a bare greeting.
const GREETING_MAX_WORDS: usize = 4;
const GREETING_MAX_CHARS: usize = 30;

static PAYMENT_CLAIM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(listo|ya|pague|pagado|pagada|transferi|deposite|ya le pague|hice el sinpe|mande el sinpe|envie el sinpe|sinpe hecho|comprobante)\b",
    )
    .unwrap_or_else(|e| panic!("invalid payment-claim regex: {e}"))
});

static SHIP_CHOICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(envio|enviar|envien|enviarlo|enviarla|envie|correo|domicilio|mandar|mandenlo|mandenla|1)\b")
        .unwrap_or_else(|e| panic!("invalid ship regex: {e}"))
});

static PICKUP_CHOICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(retiro|retirar|recoger|recojo|paso por|pasar por|tienda|local|personalmente|2)\b")
        .unwrap_or_else(|e| panic!("invalid pickup regex: {e}"))
});

/// FAQ topics, tested in order; the first match wins.
static FAQ_PATTERNS: LazyLock<Vec<(FaqTopic, Regex)>> = LazyLock::new(|| {
    [
        (
            FaqTopic::Shipping,
            r"\b(envio|envios|envian|hacen envios|entregas?|correos? de costa rica|a domicilio|mandan)\b",
        ),
        (
            FaqTopic::PaymentMethods,
            r"\b(metodos? de pago|formas? de pago|como (les )?pago|aceptan (tarjeta|sinpe|efectivo)|tarjeta|transferencia)\b",
        ),
        (
            FaqTopic::Location,
            r"\b(donde (estan|quedan|se ubican|los encuentro)|ubicacion|direccion|ubicados)\b",
        ),
        (
            FaqTopic::Hours,
            r"\b(horario|horarios|a que hora|abren|cierran|atienden)\b",
        ),
        (
            FaqTopic::Warranty,
            r"\b(garantia|cambios?|devolucion|devoluciones)\b",
        ),
        (
            FaqTopic::Price,
            r"\b(precio|precios|cuanto (cuesta|vale|sale|es|cobran)|costo|valor)\b",
        ),
        (
            FaqTopic::Stock,
            r"\b(disponible|disponibles|stock|existencias?|hay en talla|tienen en talla|les queda|quedan)\b",
        ),
    ]
    .into_iter()
    .map(|(topic, pattern)| {
        let regex =
            Regex::new(pattern).unwrap_or_else(|e| panic!("invalid FAQ regex for {topic:?}: {e}"));
        (topic, regex)
    })
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaqTopic {
    Price,
    Stock,
    Shipping,
    Hours,
    Location,
    PaymentMethods,
    Warranty,
}

/// Lowercases, strips diacritics and punctuation, collapses whitespace.
///
/// `"¡Sí, GRACIAS!"` becomes `"si gracias"`.
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when `text` starts with one of `words` followed by a word boundary.
fn starts_with_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|word| {
        text.strip_prefix(word)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '))
    })
}

pub fn is_greeting(normalized: &str) -> bool {
    starts_with_any(normalized, GREETINGS)
}

/// A greeting short enough to be nothing else.
pub fn is_short_greeting(normalized: &str) -> bool {
    is_greeting(normalized)
        && (normalized.split(' ').count() <= GREETING_MAX_WORDS
            || normalized.chars().count() < GREETING_MAX_CHARS)
}

pub fn is_yes(normalized: &str) -> bool {
    starts_with_any(normalized, YES_WORDS)
}

/// Refusals win over confirmations: "no, gracias" and "ya no" are both
/// refusals, and "no" never prefixes a confirmation.
pub fn is_no(normalized: &str) -> bool {
    starts_with_any(normalized, NO_WORDS)
}

pub fn is_payment_claim(normalized: &str) -> bool {
    PAYMENT_CLAIM.is_match(normalized)
}

pub fn faq_topic(normalized: &str) -> Option<FaqTopic> {
    FAQ_PATTERNS
        .iter()
        .find(|(_, regex)| regex.is_match(normalized))
        .map(|(topic, _)| *topic)
}

/// Delivery method named in the reply, if exactly one is.
pub fn delivery_choice(normalized: &str) -> Option<DeliveryMethod> {
    match (
        SHIP_CHOICE.is_match(normalized),
        PICKUP_CHOICE.is_match(normalized),
    ) {
        (true, false) => Some(DeliveryMethod::Ship),
        (false, true) => Some(DeliveryMethod::Pickup),
        _ => None,
    }
}

/// Messages the deterministic rules own; the language model never sees them.
pub fn is_high_priority(normalized: &str) -> bool {
    is_greeting(normalized)
        || is_yes(normalized)
        || is_no(normalized)
        || is_payment_claim(normalized)
        || matches!(
            faq_topic(normalized),
            Some(FaqTopic::Price | FaqTopic::Stock | FaqTopic::PaymentMethods)
        )
}

/// Whether a caption or message describes a product (size, colour, model).
///
/// Bare greetings and confirmations do not count.
pub fn has_product_detail(normalized: &str) -> bool {
    let alnum = normalized.chars().filter(|c| c.is_alphanumeric()).count();
    alnum >= 3 && !is_short_greeting(normalized) && !is_yes(normalized) && !is_no(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_accents_and_punctuation() {
        assert_eq!(normalize("¡Sí, GRACIAS!"), "si gracias");
        assert_eq!(normalize("  ¿Cuánto   cuesta?  "), "cuanto cuesta");
        assert_eq!(normalize("Envío a Cartago"), "envio a cartago");
        assert_eq!(normalize("ya pagué 👍"), "ya pague");
    }

    #[test]
    fn yes_is_prefix_with_word_boundary() {
        assert!(is_yes("si"));
        assert!(is_yes("si me interesa"));
        assert!(is_yes("dale"));
        assert!(is_yes("de una mae"));
        assert!(!is_yes("sinpe"));
        assert!(!is_yes("okey dokey no"));
        assert!(!is_yes("tal vez"));
    }

    #[test]
    fn no_detection() {
        assert!(is_no("no"));
        assert!(is_no("no gracias"));
        assert!(is_no("ya no"));
        assert!(is_no("mejor no"));
        assert!(!is_no("nose"));
        assert!(!is_no("si"));
    }

    #[test]
    fn greeting_must_be_short() {
        assert!(is_short_greeting("hola"));
        assert!(is_short_greeting("buenas tardes"));
        assert!(is_greeting("hola tienen esta blusa en talla m y en color azul marino"));
        assert!(!is_short_greeting(
            "hola tienen esta blusa en talla m y en color azul marino"
        ));
        assert!(!is_short_greeting("holanda"));
    }

    #[test]
    fn payment_claims() {
        assert!(is_payment_claim("ya pague"));
        assert!(is_payment_claim("listo"));
        assert!(is_payment_claim("ya le transferi"));
        assert!(is_payment_claim("le mande el comprobante"));
        assert!(!is_payment_claim("cuanto es"));
        assert!(!is_payment_claim("yael"));
    }

    #[test]
    fn faq_topics() {
        assert_eq!(faq_topic("cuanto cuesta"), Some(FaqTopic::Price));
        assert_eq!(faq_topic("hacen envios a limon"), Some(FaqTopic::Shipping));
        assert_eq!(faq_topic("a que hora abren"), Some(FaqTopic::Hours));
        assert_eq!(faq_topic("donde estan ubicados"), Some(FaqTopic::Location));
        assert_eq!(faq_topic("aceptan tarjeta"), Some(FaqTopic::PaymentMethods));
        assert_eq!(faq_topic("tienen garantia"), Some(FaqTopic::Warranty));
        assert_eq!(faq_topic("esta disponible"), Some(FaqTopic::Stock));
        assert_eq!(faq_topic("me encanta"), None);
    }

    #[test]
    fn delivery_choices() {
        assert_eq!(delivery_choice("envio"), Some(DeliveryMethod::Ship));
        assert_eq!(delivery_choice("por correo porfa"), Some(DeliveryMethod::Ship));
        assert_eq!(delivery_choice("1"), Some(DeliveryMethod::Ship));
        assert_eq!(delivery_choice("paso por la tienda"), Some(DeliveryMethod::Pickup));
        assert_eq!(delivery_choice("2"), Some(DeliveryMethod::Pickup));
        assert_eq!(delivery_choice("no se"), None);
        assert_eq!(delivery_choice("envio o retiro"), None);
    }

    #[test]
    fn product_detail_excludes_small_talk() {
        assert!(has_product_detail("talla m azul"));
        assert!(has_product_detail("la negra en 38"));
        assert!(!has_product_detail("hola"));
        assert!(!has_product_detail("ok"));
        assert!(!has_product_detail(""));
    }

    #[test]
    fn high_priority_messages() {
        assert!(is_high_priority("cuanto cuesta"));
        assert!(is_high_priority("hola"));
        assert!(is_high_priority("ya pague"));
        assert!(!is_high_priority("que material es la tela de esa blusa"));
    }
}
