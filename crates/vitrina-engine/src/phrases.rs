// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rotating reply phrases.
//!
//! Each category has a few interchangeable wordings. The pool remembers the
//! last variant used per (category, session) and never hands out the same one
//! twice in a row, so replies do not read like a bot.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strum::{Display, EnumIter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum PhraseCategory {
    Greeting,
    AskPhoto,
    AskDetails,
    QuoteForwarded,
    OneImageAtATime,
    QuoteOffer,
    OutOfTokens,
    Declined,
    ChooseDelivery,
    AskShippingInfo,
    AskPickupInfo,
    PaymentInstructions,
    PaymentClaimAck,
    PaymentConfirmed,
    ReceiptReceived,
    NoStock,
    SessionClosed,
    Reminder,
}

impl PhraseCategory {
    fn variants(self) -> &'static [&'static str] {
        match self {
            Self::Greeting => &[
                "¡Hola! 👋 Gracias por escribirnos.",
                "¡Hola! Qué gusto saludarte 😊",
                "¡Pura vida! Gracias por escribir.",
            ],
            Self::AskPhoto => &[
                "Mandanos una foto del producto que te interesa y te confirmamos precio y disponibilidad.",
                "Si nos enviás la foto del artículo, te decimos el precio y si lo tenemos.",
                "¿Nos compartís una foto de lo que buscás? Así te cotizamos de una vez.",
            ],
            Self::AskDetails => &[
                "¡Linda elección! ¿Qué talla o color lo buscás?",
                "Recibimos la foto. ¿Nos decís la talla y el color que querés?",
                "Perfecto. Para cotizarlo, ¿qué talla y color necesitás?",
            ],
            Self::QuoteForwarded => &[
                "¡Listo! Ya lo consultamos, en un momento te confirmamos precio y disponibilidad.",
                "Recibido. Estamos revisando disponibilidad y te escribimos en un ratito.",
                "Gracias, ya le pasamos tu consulta a la tienda. Te avisamos pronto.",
            ],
            Self::OneImageAtATime => &[
                "Recibimos varias fotos. Para cotizarte bien, mandanos una sola foto por producto, por favor.",
                "¡Gracias! Para no confundirnos, enviá una foto a la vez con la talla y el color.",
            ],
            Self::QuoteOffer => &[
                "¡Sí lo tenemos! 🙌",
                "¡Buenas noticias, está disponible!",
                "¡Lo tenemos disponible!",
            ],
            Self::OutOfTokens => &[
                "En este momento no podemos procesar más pedidos por este medio. Por favor escribinos de nuevo el próximo mes o esperá a que la tienda te contacte.",
                "Por ahora alcanzamos el límite de pedidos de este mes. La tienda te va a contactar directamente.",
            ],
            Self::Declined => &[
                "¡Con gusto! Si te interesa algo más, mandanos la foto cuando querás.",
                "Entendido, gracias por consultar. Aquí estamos para lo que ocupés.",
                "No hay problema. Cuando veás otra cosa que te guste, nos escribís.",
            ],
            Self::ChooseDelivery => &[
                "¿Preferís envío (1) o retiro en tienda (2)?",
                "¿Cómo lo querés recibir? Respondé 1 para envío o 2 para retirarlo.",
            ],
            Self::AskShippingInfo => &[
                "Para el envío necesitamos: nombre completo, teléfono y dirección exacta (provincia, cantón, distrito y señas).",
                "Pasanos por favor tu nombre, teléfono y la dirección completa para el envío.",
            ],
            Self::AskPickupInfo => &[
                "¡Perfecto! ¿A nombre de quién lo apartamos y qué día pasarías a recogerlo?",
                "Con gusto. Decinos el nombre de quien lo retira y cuándo pasarías.",
            ],
            Self::PaymentInstructions => &[
                "¡Gracias! Para confirmar tu pedido hacé el SINPE Móvil:",
                "¡Casi listo! Solo falta el pago por SINPE Móvil:",
            ],
            Self::PaymentClaimAck => &[
                "¡Gracias! Estamos verificando el pago y te confirmamos en breve.",
                "Recibido. En cuanto la tienda verifique el SINPE te avisamos.",
            ],
            Self::PaymentConfirmed => &[
                "¡Pago confirmado! 🎉 Gracias por tu compra.",
                "¡Listo, recibimos tu pago! Muchas gracias por comprar con nosotros.",
            ],
            Self::ReceiptReceived => &[
                "¡Gracias por el comprobante! Lo estamos verificando.",
                "Recibimos la imagen del comprobante, en un momento te confirmamos.",
            ],
            Self::NoStock => &[
                "Lo sentimos, ese producto ya no está disponible 😔 Si querés, mandanos foto de otro que te guste.",
                "Qué pena, se nos agotó. ¿Te interesa ver otra opción? Mandanos la foto.",
            ],
            Self::SessionClosed => &[
                "Cerramos esta consulta por falta de respuesta. Si todavía te interesa, escribinos de nuevo.",
                "Como no tuvimos respuesta, dejamos la consulta en pausa. ¡Aquí estamos cuando querás!",
            ],
            Self::Reminder => &[
                "¡Hola! ¿Pudiste ver la cotización? Te la guardamos un ratito más.",
                "Solo para recordarte la cotización que te enviamos 😊",
            ],
        }
    }
}

/// Hands out non-repeating phrase variants.
pub struct PhrasePool {
    last: HashMap<(PhraseCategory, String), usize>,
    rng: StdRng,
}

impl PhrasePool {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// A deterministic pool for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            last: HashMap::new(),
            rng,
        }
    }

    /// Picks a variant different from the last one given to `session_id`.
    pub fn next(&mut self, category: PhraseCategory, session_id: &str) -> &'static str {
        let variants = category.variants();
        let key = (category, session_id.to_string());
        let index = match (variants.len(), self.last.get(&key)) {
            (0 | 1, _) | (_, None) => self.rng.gen_range(0..variants.len().max(1)),
            (n, Some(&previous)) => {
                // Draw from the n-1 other slots, then shift past the previous one.
                let pick = self.rng.gen_range(0..n - 1);
                if pick >= previous { pick + 1 } else { pick }
            }
        };
        self.last.insert(key, index);
        variants.get(index).copied().unwrap_or_default()
    }

    /// Drops rotation memory for a session.
    pub fn forget(&mut self, session_id: &str) {
        self.last.retain(|(_, id), _| id != session_id);
    }
}

impl Default for PhrasePool {
    fn default() -> Self {
        Self::new()
    }
}
