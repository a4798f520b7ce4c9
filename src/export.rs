//! Quantized model export.
//!
//! The exported artifact holds every float parameter of the module as
//! per-tensor symmetric int8 values with a single f32 scale, serialized with
//! MessagePack and gzip-compressed. Tensors are stored in module visit
//! order, which is deterministic for a given module structure, so the
//! artifact can be restored into a freshly initialized module of the same
//! architecture.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use burn::module::{Module, ModuleMapper, ModuleVisitor, ParamId};
use burn::tensor::{backend::Backend, Tensor, TensorData};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("artifact encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("artifact decoding failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("artifact does not match the module: {0}")]
    Mismatch(String),
}

/// One float parameter tensor, quantized to int8.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedTensor {
    pub dims: Vec<usize>,
    pub scale: f32,
    pub values: Vec<i8>,
}

impl QuantizedTensor {
    /// Quantizes `values` with per-tensor symmetric min-max calibration:
    /// `scale = max(|v|) / 127`, values rounded and clamped to `[-127, 127]`.
    pub fn quantize(values: &[f32], dims: Vec<usize>) -> Self {
        let max_abs = values.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
        let scale = if max_abs == 0.0 { 1.0 } else { max_abs / 127.0 };

        let values = values
            .iter()
            .map(|v| (v / scale).round().clamp(-127.0, 127.0) as i8)
            .collect();

        Self {
            dims,
            scale,
            values,
        }
    }

    pub fn dequantize(&self) -> Vec<f32> {
        self.values.iter().map(|q| f32::from(*q) * self.scale).collect()
    }

    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }
}

/// The exported artifact: all float parameters of a module, quantized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantizedModel {
    tensors: Vec<QuantizedTensor>,
}

struct WeightCollector {
    tensors: Vec<QuantizedTensor>,
}

impl<B: Backend> ModuleVisitor<B> for WeightCollector {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        let values = tensor
            .to_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .unwrap();

        self.tensors
            .push(QuantizedTensor::quantize(&values, tensor.dims().to_vec()));
    }
}

struct WeightRestorer {
    tensors: VecDeque<QuantizedTensor>,
    error: Option<ExportError>,
}

impl<B: Backend> ModuleMapper<B> for WeightRestorer {
    fn map_float<const D: usize>(&mut self, _id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        if self.error.is_some() {
            return tensor;
        }

        let stored = match self.tensors.pop_front() {
            Some(stored) => stored,
            None => {
                self.error = Some(ExportError::Mismatch(
                    "module has more float tensors than the artifact".into(),
                ));
                return tensor;
            }
        };

        if stored.dims != tensor.dims().to_vec() {
            self.error = Some(ExportError::Mismatch(format!(
                "expected tensor of shape {:?}, artifact holds {:?}",
                tensor.dims().to_vec(),
                stored.dims
            )));
            return tensor;
        }

        let device = tensor.device();
        let data = TensorData::new(stored.dequantize(), stored.dims.clone());

        Tensor::from_data(data.convert::<B::FloatElem>(), &device)
    }
}

impl QuantizedModel {
    /// Quantizes every float parameter of `module`.
    pub fn from_module<B: Backend, M: Module<B>>(module: &M) -> Self {
        let mut collector = WeightCollector {
            tensors: Vec::new(),
        };
        module.visit(&mut collector);

        Self {
            tensors: collector.tensors,
        }
    }

    /// Restores the quantized weights into `module`, dequantizing each
    /// tensor. The module must have the same float tensors, in the same
    /// visit order and with the same shapes, as the one the artifact was
    /// built from.
    pub fn apply<B: Backend, M: Module<B>>(&self, module: M) -> Result<M, ExportError> {
        let mut restorer = WeightRestorer {
            tensors: self.tensors.iter().cloned().collect(),
            error: None,
        };
        let module = module.map(&mut restorer);

        if let Some(error) = restorer.error {
            return Err(error);
        }
        if !restorer.tensors.is_empty() {
            return Err(ExportError::Mismatch(format!(
                "artifact holds {} unused tensors",
                restorer.tensors.len()
            )));
        }

        Ok(module)
    }

    pub fn tensors(&self) -> &[QuantizedTensor] {
        &self.tensors
    }

    /// Serializes the artifact to its on-disk representation.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ExportError> {
        let encoded = rmp_serde::to_vec(self)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&encoded)?;

        Ok(encoder.finish()?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ExportError> {
        let mut decoder = GzDecoder::new(bytes);
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded)?;

        Ok(rmp_serde::from_slice(&decoded)?)
    }

    /// Writes the artifact, overwriting any existing file at `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let bytes = self.to_bytes()?;
        let mut file = File::create(path.as_ref())?;
        file.write_all(&bytes)?;

        log::debug!(
            "wrote {} quantized tensors ({} bytes) to {}",
            self.tensors.len(),
            bytes.len(),
            path.as_ref().display()
        );

        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ExportError> {
        Self::from_bytes(&std::fs::read(path)?)
    }
}
