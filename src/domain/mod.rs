// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that define the core concepts of the
// system: the character vocabulary, a labelled sample, and
// the traits the other layers implement.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O beyond what a trait default needs
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Character ↔ class index tables with the reserved CTC blank
pub mod vocabulary;

// A (filename, label) row of the labels table
pub mod sample;

// Core abstractions (traits) that other layers implement
pub mod traits;
