//! MNIST digit classifier training pipeline.
//!
//! Loads the built-in MNIST split, rescales pixels to `[0, 1]`, augments
//! every access with a random affine transform, trains a small CNN and
//! exports the trained weights as a quantized, gzip-compressed artifact
//! suitable for embedding in a mobile application.

/// Random affine augmentation of training images.
pub mod augment;
/// Batching and pixel normalization.
pub mod data;
/// Quantized artifact format and export/restore.
pub mod export;
/// Single-image classification.
pub mod inference;
/// The convolutional network.
pub mod model;
/// Training loop and full pipeline entry point.
pub mod training;
