// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers to accomplish one goal each.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No argument parsing here (that's Layer 1)
//   - Only workflow coordination

// Synthetic dataset generation
pub mod generate_use_case;

// The training workflow
pub mod train_use_case;

// Single-image prediction and table evaluation
pub mod predict_use_case;
