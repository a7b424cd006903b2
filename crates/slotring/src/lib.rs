//! slotring - Fixed-Capacity MPSC Ring of Owned Slots
//!
//! The buffering core of a telemetry batch pipeline. Producer threads move
//! values into a bounded ring without locks; a single consumer thread drains
//! them in batches, seeing wrapped regions of the ring as one logical range.
//!
//! # Building Blocks
//!
//! - [`OwnedSlot`] - an atomic cell holding zero or one boxed value
//! - [`RingRange`] - a non-owning two-span view over a possibly wrapped region
//! - [`RingBuffer`] - the ring itself: concurrent `try_add`, single-consumer
//!   `peek`/`consume`
//!
//! # Example
//!
//! ```
//! use slotring::RingBuffer;
//!
//! let ring = RingBuffer::<u64>::new(4);
//!
//! assert!(ring.try_add(1).is_ok());
//! assert!(ring.try_add(2).is_ok());
//!
//! // Batch consume, taking ownership of every value in the window
//! let mut batch = Vec::new();
//! let consumed = ring.consume(2, |range| {
//!     range.for_each(|slot| {
//!         if let Some(value) = slot.take() {
//!             batch.push(*value);
//!         }
//!         true
//!     });
//! });
//!
//! assert_eq!(consumed, 2);
//! assert_eq!(batch, vec![1, 2]);
//! ```

mod invariants;
mod range;
mod ring;
mod slot;
mod sync;

pub use range::{Iter, RingRange};
pub use ring::RingBuffer;
pub use slot::OwnedSlot;
