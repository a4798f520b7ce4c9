use burn::{
    config::Config,
    data::dataset::{vision::MnistItem, Dataset},
};
use rand::Rng;

const WIDTH: usize = 28;
const HEIGHT: usize = 28;

/// Magnitudes of the random geometric perturbations applied to training
/// images. All values are treated as absolute magnitudes; a perturbation is
/// sampled uniformly from `[-magnitude, magnitude]` on every access.
#[derive(Config, Debug)]
pub struct AugmentationConfig {
    /// Maximum rotation, in degrees.
    #[config(default = 20.0)]
    pub rotation_degrees: f64,
    /// Maximum horizontal shift, as a fraction of the image width.
    #[config(default = 0.2)]
    pub width_shift: f64,
    /// Maximum shear factor along the x axis.
    #[config(default = 0.25)]
    pub shear: f64,
    /// Maximum zoom deviation from 1.0.
    #[config(default = 0.1)]
    pub zoom: f64,
}

/// 2D affine transform in homogeneous coordinates.
///
/// Transforms are composed with [`Affine::mul`] and applied to column
/// vectors, so `a.mul(&b)` applies `b` first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine {
    m: [[f32; 3]; 3],
}

impl Affine {
    pub fn identity() -> Self {
        Self {
            m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// Rotation by `theta` radians around `(cx, cy)`.
    pub fn rotation(theta: f32, cx: f32, cy: f32) -> Self {
        let cos = theta.cos();
        let sin = theta.sin();

        Self {
            m: [
                [cos, -sin, cx - cos * cx + sin * cy],
                [sin, cos, cy - sin * cx - cos * cy],
                [0.0, 0.0, 1.0],
            ],
        }
    }

    pub fn translation(tx: f32, ty: f32) -> Self {
        Self {
            m: [[1.0, 0.0, tx], [0.0, 1.0, ty], [0.0, 0.0, 1.0]],
        }
    }

    /// Shear along the x axis around `(cx, cy)`.
    pub fn shear(kx: f32, cx: f32, cy: f32) -> Self {
        Self {
            m: [[1.0, kx, -kx * cy], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// Scaling by `(sx, sy)` around `(cx, cy)`.
    pub fn scale(sx: f32, sy: f32, cx: f32, cy: f32) -> Self {
        Self {
            m: [
                [sx, 0.0, cx - sx * cx],
                [0.0, sy, cy - sy * cy],
                [0.0, 0.0, 1.0],
            ],
        }
    }

    pub fn mul(&self, other: &Affine) -> Affine {
        let mut result = [[0.0f32; 3]; 3];

        for i in 0..3 {
            for j in 0..3 {
                result[i][j] = self.m[i][0] * other.m[0][j]
                    + self.m[i][1] * other.m[1][j]
                    + self.m[i][2] * other.m[2][j];
            }
        }

        Affine { m: result }
    }

    /// Inverse transform, or `None` when the transform is degenerate.
    pub fn invert(&self) -> Option<Affine> {
        let [[a, b, c], [d, e, f], _] = self.m;
        let det = a * e - b * d;
        if det.abs() < f32::EPSILON {
            return None;
        }

        let ia = e / det;
        let ib = -b / det;
        let id = -d / det;
        let ie = a / det;

        Some(Affine {
            m: [
                [ia, ib, -(ia * c + ib * f)],
                [id, ie, -(id * c + ie * f)],
                [0.0, 0.0, 1.0],
            ],
        })
    }

    /// Maps the point `(x, y)` through the transform.
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.m[0][0] * x + self.m[0][1] * y + self.m[0][2],
            self.m[1][0] * x + self.m[1][1] * y + self.m[1][2],
        )
    }
}

impl AugmentationConfig {
    /// Samples one random transform: translation, rotation, shear and zoom
    /// composed around the image center.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Affine {
        let center = (WIDTH as f32 - 1.0) / 2.0;

        let rotation = self.rotation_degrees.abs() as f32;
        let shift = self.width_shift.abs() as f32 * WIDTH as f32;
        let shear = self.shear.abs() as f32;
        let zoom = self.zoom.abs() as f32;

        let theta = rng.gen_range(-rotation..=rotation).to_radians();
        let tx = rng.gen_range(-shift..=shift);
        let kx = rng.gen_range(-shear..=shear);
        let scale = 1.0 + rng.gen_range(-zoom..=zoom);

        Affine::translation(tx, 0.0)
            .mul(&Affine::rotation(theta, center, center))
            .mul(&Affine::shear(kx, center, center))
            .mul(&Affine::scale(scale, scale, center, center))
    }
}

/// Resamples `image` through `transform` with bilinear interpolation.
///
/// Output pixels are mapped back through the inverse transform; samples
/// falling outside the source image read as zero (black background). A
/// degenerate transform leaves the image untouched.
pub fn warp(image: &[[f32; WIDTH]; HEIGHT], transform: &Affine) -> [[f32; WIDTH]; HEIGHT] {
    let inverse = match transform.invert() {
        Some(inverse) => inverse,
        None => return *image,
    };

    let mut output = [[0.0f32; WIDTH]; HEIGHT];
    for (y, row) in output.iter_mut().enumerate() {
        for (x, pixel) in row.iter_mut().enumerate() {
            let (sx, sy) = inverse.apply(x as f32, y as f32);
            *pixel = sample_bilinear(image, sx, sy);
        }
    }

    output
}

fn sample_bilinear(image: &[[f32; WIDTH]; HEIGHT], sx: f32, sy: f32) -> f32 {
    let x0 = sx.floor();
    let y0 = sy.floor();
    let dx = sx - x0;
    let dy = sy - y0;

    let mut acc = 0.0;
    for (iy, wy) in [(y0, 1.0 - dy), (y0 + 1.0, dy)] {
        for (ix, wx) in [(x0, 1.0 - dx), (x0 + 1.0, dx)] {
            if (0.0..WIDTH as f32).contains(&ix) && (0.0..HEIGHT as f32).contains(&iy) {
                acc += wx * wy * image[iy as usize][ix as usize];
            }
        }
    }

    acc
}

/// A dataset adapter that applies a freshly sampled random affine transform
/// on every access.
///
/// Labels pass through unchanged. Because the transform is drawn per access,
/// each epoch of a wrapping data loader sees a different perturbation of the
/// same underlying images, which is what makes the sequence lazy, infinite in
/// effect and restartable.
pub struct AugmentedDataset<D> {
    dataset: D,
    config: AugmentationConfig,
}

impl<D> AugmentedDataset<D>
where
    D: Dataset<MnistItem>,
{
    pub fn new(dataset: D, config: AugmentationConfig) -> Self {
        Self { dataset, config }
    }
}

impl<D> Dataset<MnistItem> for AugmentedDataset<D>
where
    D: Dataset<MnistItem>,
{
    fn get(&self, index: usize) -> Option<MnistItem> {
        let item = self.dataset.get(index)?;
        let transform = self.config.sample(&mut rand::thread_rng());

        Some(MnistItem {
            image: warp(&item.image, &transform),
            label: item.label,
        })
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::InMemDataset;

    fn impulse(x: usize, y: usize) -> [[f32; WIDTH]; HEIGHT] {
        let mut image = [[0.0f32; WIDTH]; HEIGHT];
        image[y][x] = 255.0;
        image
    }

    fn disabled() -> AugmentationConfig {
        AugmentationConfig::new()
            .with_rotation_degrees(0.0)
            .with_width_shift(0.0)
            .with_shear(0.0)
            .with_zoom(0.0)
    }

    #[test]
    fn identity_warp_preserves_image() {
        let image = impulse(10, 5);
        assert_eq!(warp(&image, &Affine::identity()), image);
    }

    #[test]
    fn translation_moves_pixels() {
        let image = impulse(10, 5);
        let shifted = warp(&image, &Affine::translation(3.0, 0.0));
        assert_eq!(shifted[5][13], 255.0);
        assert_eq!(shifted[5][10], 0.0);
    }

    #[test]
    fn out_of_bounds_samples_read_as_zero() {
        let image = impulse(0, 0);
        let shifted = warp(&image, &Affine::translation(-1.0, 0.0));
        assert!(shifted.iter().flatten().all(|v| *v == 0.0));
    }

    #[test]
    fn inverse_composes_to_identity() {
        let transform = Affine::translation(2.0, -1.0)
            .mul(&Affine::rotation(0.3, 13.5, 13.5))
            .mul(&Affine::scale(1.1, 0.9, 13.5, 13.5));
        let inverse = transform.invert().unwrap();
        let identity = transform.mul(&inverse);

        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((identity.m[i][j] - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn warp_preserves_value_range() {
        let mut rng = rand::thread_rng();
        let config = AugmentationConfig::new();
        let image = impulse(14, 14);

        for _ in 0..20 {
            let transform = config.sample(&mut rng);
            let warped = warp(&image, &transform);
            assert!(warped.iter().flatten().all(|v| (0.0..=255.0).contains(v)));
        }
    }

    #[test]
    fn zero_magnitudes_sample_the_identity() {
        let transform = disabled().sample(&mut rand::thread_rng());
        let image = impulse(20, 7);
        assert_eq!(warp(&image, &transform), image);
    }

    #[test]
    fn augmented_dataset_keeps_length_and_labels() {
        let items = vec![
            MnistItem {
                image: impulse(3, 3),
                label: 3,
            },
            MnistItem {
                image: impulse(9, 9),
                label: 9,
            },
        ];
        let dataset = AugmentedDataset::new(InMemDataset::new(items), AugmentationConfig::new());

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(0).unwrap().label, 3);
        assert_eq!(dataset.get(1).unwrap().label, 9);
        assert!(dataset.get(2).is_none());
    }
}
