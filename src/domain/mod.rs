// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe a conversation corpus:
// utterance pairs, the special vocabulary ids shared by the
// data pipeline and the model, and the bucket shapes used to
// batch pairs of similar length together.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, constants and traits

// A query/reply pair, raw and tokenised
pub mod dialogue;

// Special token ids (_PAD, _GO, _EOS, _UNK)
pub mod vocab;

// (encoder_size, decoder_size) shape classes
pub mod bucket;

// Core abstractions (traits) that other layers implement
pub mod traits;
