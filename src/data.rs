use burn::{
    data::{dataloader::batcher::Batcher, dataset::vision::MnistItem},
    prelude::*,
};

/// Converts raw MNIST items into tensors.
///
/// Pixel intensities are rescaled from `[0, 255]` to `[0, 1]` and images are
/// stacked as `[batch, 1, 28, 28]` with an explicit channel dimension.
#[derive(Clone, Default)]
pub struct MnistBatcher {}

#[derive(Clone, Debug)]
pub struct MnistBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, MnistItem, MnistBatch<B>> for MnistBatcher {
    fn batch(&self, items: Vec<MnistItem>, device: &B::Device) -> MnistBatch<B> {
        let images = items
            .iter()
            .map(|item| TensorData::from(item.image))
            .map(|data| Tensor::<B, 2>::from_data(data.convert::<B::FloatElem>(), device))
            .map(|tensor| tensor.reshape([1, 1, 28, 28]))
            .map(|tensor| tensor / 255)
            .collect();

        let targets = items
            .iter()
            .map(|item| {
                Tensor::<B, 1, Int>::from_data(
                    TensorData::from([(item.label as i64).elem::<B::IntElem>()]),
                    device,
                )
            })
            .collect();

        let images = Tensor::cat(images, 0);
        let targets = Tensor::cat(targets, 0);

        MnistBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn item(fill: f32, label: u8) -> MnistItem {
        MnistItem {
            image: [[fill; 28]; 28],
            label,
        }
    }

    #[test]
    fn batch_has_matching_image_and_target_sizes() {
        let device = Default::default();
        let batcher = MnistBatcher::default();

        let batch: MnistBatch<TestBackend> =
            batcher.batch(vec![item(0.0, 0), item(128.0, 5), item(255.0, 9)], &device);

        assert_eq!(batch.images.dims(), [3, 1, 28, 28]);
        assert_eq!(batch.targets.dims(), [3]);
    }

    #[test]
    fn pixels_are_rescaled_to_unit_range() {
        let device = Default::default();
        let batcher = MnistBatcher::default();

        let batch: MnistBatch<TestBackend> =
            batcher.batch(vec![item(0.0, 0), item(255.0, 1)], &device);

        let values = batch.images.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(values[0], 0.0);
        assert_eq!(values[28 * 28], 1.0);
    }

    #[test]
    fn targets_keep_label_order() {
        let device = Default::default();
        let batcher = MnistBatcher::default();

        let batch: MnistBatch<TestBackend> =
            batcher.batch(vec![item(0.0, 7), item(0.0, 2)], &device);

        let targets = batch.targets.into_data().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![7, 2]);
    }
}
