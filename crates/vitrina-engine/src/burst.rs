// SPDX-FileCopyrightText: 2026 Vitrina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Photo-burst coalescing.
//!
//! Customers often send several photos in a row. Images are buffered per
//! customer and released together once the customer has been quiet for the
//! burst interval; the quiet timer itself lives in the runtime's timer slots.

use std::collections::HashMap;

/// One buffered image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstImage {
    pub image_ref: String,
    pub caption: Option<String>,
}

#[derive(Debug, Default)]
pub struct BurstCoalescer {
    buffers: HashMap<String, Vec<BurstImage>>,
}

impl BurstCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers an image in arrival order. Returns the burst size so far.
    pub fn push(&mut self, customer_id: &str, image: BurstImage) -> usize {
        let buffer = self.buffers.entry(customer_id.to_string()).or_default();
        buffer.push(image);
        buffer.len()
    }

    /// Ends the burst and hands back everything buffered, oldest first.
    pub fn take(&mut self, customer_id: &str) -> Vec<BurstImage> {
        self.buffers.remove(customer_id).unwrap_or_default()
    }

    pub fn is_open(&self, customer_id: &str) -> bool {
        self.buffers.contains_key(customer_id)
    }

    /// Customers with an open burst.
    pub fn open_bursts(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(n: usize) -> BurstImage {
        BurstImage {
            image_ref: format!("media-{n}"),
            caption: None,
        }
    }

    #[test]
    fn take_returns_arrival_order_and_closes_burst() {
        let mut coalescer = BurstCoalescer::new();
        for n in 0..4 {
            assert_eq!(coalescer.push("a", image(n)), n + 1);
        }
        coalescer.push("b", image(9));

        let burst = coalescer.take("a");
        let refs: Vec<_> = burst.iter().map(|i| i.image_ref.as_str()).collect();
        assert_eq!(refs, ["media-0", "media-1", "media-2", "media-3"]);
        assert!(!coalescer.is_open("a"));
        assert!(coalescer.is_open("b"));
        assert!(coalescer.take("a").is_empty());
    }

    #[test]
    fn bursts_are_per_customer() {
        let mut coalescer = BurstCoalescer::new();
        coalescer.push("a", image(1));
        coalescer.push("b", image(2));
        assert_eq!(coalescer.open_bursts(), 2);
        assert_eq!(coalescer.take("b"), vec![image(2)]);
    }
}
