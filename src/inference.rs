use crate::{
    data::MnistBatcher,
    export::{ExportError, QuantizedModel},
    model::{Model, ModelConfig},
};
use burn::{
    data::{dataloader::batcher::Batcher, dataset::vision::MnistItem},
    tensor::{activation::softmax, backend::Backend, ElementConversion},
};

/// Classification result for a single digit image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Predicted class in `[0, 9]`.
    pub digit: u8,
    /// Softmax probability of the predicted class.
    pub confidence: f32,
}

/// Builds a model from an exported artifact.
pub fn load_model<B: Backend>(
    artifact: &QuantizedModel,
    config: &ModelConfig,
    device: &B::Device,
) -> Result<Model<B>, ExportError> {
    artifact.apply(config.init::<B>(device))
}

/// Classifies one image, returning the most likely digit and its
/// probability.
pub fn predict<B: Backend>(model: &Model<B>, item: MnistItem, device: &B::Device) -> Prediction {
    let batcher = MnistBatcher::default();
    let batch = batcher.batch(vec![item], device);

    let probabilities = softmax(model.forward(batch.images), 1);

    let digit = probabilities
        .clone()
        .argmax(1)
        .flatten::<1>(0, 1)
        .into_scalar()
        .elem::<i64>() as u8;
    let confidence = probabilities
        .max_dim(1)
        .flatten::<1>(0, 1)
        .into_scalar()
        .elem::<f32>();

    Prediction { digit, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn prediction_is_a_valid_class_with_a_plausible_confidence() {
        let device = Default::default();
        let model: Model<TestBackend> = ModelConfig::new().init(&device);

        let item = MnistItem {
            image: [[128.0; 28]; 28],
            label: 0,
        };
        let prediction = predict(&model, item, &device);

        assert!(prediction.digit <= 9);
        // The winning class is at least as likely as the uniform guess.
        assert!(prediction.confidence >= 0.1);
        assert!(prediction.confidence <= 1.0);
    }

    #[test]
    fn exported_artifact_round_trips_into_a_working_model() {
        let device = Default::default();
        let config = ModelConfig::new();
        let trained: Model<TestBackend> = config.init(&device);

        let artifact = QuantizedModel::from_module(&trained);
        let model = load_model::<TestBackend>(&artifact, &config, &device).unwrap();

        let item = MnistItem {
            image: [[0.0; 28]; 28],
            label: 0,
        };
        let prediction = predict(&model, item, &device);
        assert!(prediction.digit <= 9);
    }
}
