// src/extract/batch.rs
// =============================================================================
// Grouping records into LLM-sized batches.
//
// Two flavours:
// - chunk: fixed number of records per batch (product extraction)
// - TokenBudget: pack records until an estimated token budget is reached
//   (table extraction, where a single table can be enormous)
//
// Both keep the input order and never place a record in two batches.
// =============================================================================

use anyhow::{bail, Result};

// Rough token estimate: about 4 characters per token for Gemini models.
// Deliberately crude; it only has to keep us under the context window.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

// Splits `items` into consecutive chunks of at most `size` items
//
// Every item lands in exactly one chunk and the chunks, concatenated, give
// back the original slice. A size of zero is rejected.
pub fn chunk<T>(items: &[T], size: usize) -> Result<Vec<&[T]>> {
    if size == 0 {
        bail!("batch size must be at least 1");
    }
    Ok(items.chunks(size).collect())
}

// One batch produced by TokenBudget::pack
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBatch {
    // 1-based position (in the input) of the first item in this batch
    pub first_index: usize,
    pub items: Vec<String>,
    pub estimated_tokens: usize,
}

// Result of packing: the batches plus the items that were too big to send
#[derive(Debug, Default)]
pub struct Packed {
    pub batches: Vec<TokenBatch>,
    // (1-based index, estimated tokens) of every skipped item
    pub skipped: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenBudget {
    pub max_tokens: usize,
    // Share of max_tokens we allow ourselves; the rest is headroom for the
    // prompt text and the model's answer
    pub ratio: f64,
}

impl TokenBudget {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            ratio: 0.8,
        }
    }

    pub fn limit(&self) -> usize {
        (self.max_tokens as f64 * self.ratio) as usize
    }

    // Packs items greedily, in order
    //
    // - An item estimated above the limit is skipped on its own
    // - Otherwise it joins the current batch if the batch stays under the
    //   limit, or starts a new batch
    pub fn pack(&self, items: Vec<String>) -> Packed {
        let limit = self.limit();
        let mut packed = Packed::default();
        let mut current: Option<TokenBatch> = None;

        for (offset, item) in items.into_iter().enumerate() {
            let index = offset + 1;
            let tokens = estimate_tokens(&item);

            if tokens > limit {
                packed.skipped.push((index, tokens));
                continue;
            }

            match current.as_mut() {
                Some(batch) if batch.estimated_tokens + tokens < limit => {
                    batch.items.push(item);
                    batch.estimated_tokens += tokens;
                }
                _ => {
                    if let Some(full) = current.take() {
                        packed.batches.push(full);
                    }
                    current = Some(TokenBatch {
                        first_index: index,
                        items: vec![item],
                        estimated_tokens: tokens,
                    });
                }
            }
        }

        if let Some(last) = current {
            packed.batches.push(last);
        }

        packed
    }
}
