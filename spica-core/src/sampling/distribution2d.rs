use super::Distribution1D;
use crate::Point2f;

/// Piecewise-constant 2D distribution: one conditional distribution per row
/// plus the marginal over rows. Used to importance-sample environment maps.
#[derive(Debug)]
pub struct Distribution2D {
    p_conditional_v: Vec<Distribution1D>,
    p_marginal: Distribution1D,
}

impl Distribution2D {
    pub fn new(func: &[f32], nu: usize, nv: usize) -> Distribution2D {
        debug_assert_eq!(func.len(), nu * nv);
        let p_conditional_v: Vec<Distribution1D> = (0..nv)
            .map(|v| Distribution1D::new(&func[v * nu..(v + 1) * nu]))
            .collect();
        let marginal_func: Vec<f32> = p_conditional_v.iter().map(|d| d.func_int).collect();
        let p_marginal = Distribution1D::new(&marginal_func[..]);

        Distribution2D {
            p_conditional_v,
            p_marginal,
        }
    }

    pub fn sample_continuous(&self, u: &Point2f) -> (Point2f, f32) {
        let (d1, pdf1, v) = self.p_marginal.sample_continuous(u[1]);
        let (d0, pdf0, _) = self.p_conditional_v[v].sample_continuous(u[0]);
        (Point2f::new(d0, d1), pdf0 * pdf1)
    }

    pub fn pdf(&self, p: &Point2f) -> f32 {
        let iu = crate::clamp(
            (p[0] * self.p_conditional_v[0].count() as f32) as usize,
            0,
            self.p_conditional_v[0].count() - 1,
        );
        let iv = crate::clamp(
            (p[1] * self.p_marginal.count() as f32) as usize,
            0,
            self.p_marginal.count() - 1,
        );
        if self.p_marginal.func_int == 0.0 {
            return 0.0;
        }
        self.p_conditional_v[iv].func[iu] / self.p_marginal.func_int
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Rng;

    #[test]
    fn test_sample_matches_pdf() {
        // A 2x2 image with all the weight in one texel: samples land there.
        let func = [0.0, 0.0, 0.0, 10.0];
        let d = Distribution2D::new(&func[..], 2, 2);
        let mut rng = Rng::with_sequence(6);
        for _ in 0..100 {
            let u = Point2f::new(rng.uniform_f32(), rng.uniform_f32());
            let (p, pdf) = d.sample_continuous(&u);
            assert!(p.x >= 0.5 && p.y >= 0.5, "p = {:?}", p);
            assert!(pdf > 0.0);
            // The returned pdf agrees with the pdf query
            assert!((d.pdf(&p) - pdf).abs() / pdf < 1e-4);
        }
    }

    #[test]
    fn test_pdf_integrates_to_one() {
        let func = [1.0, 3.0, 2.0, 4.0, 0.5, 1.5];
        let d = Distribution2D::new(&func[..], 3, 2);
        let mut sum = 0.0f64;
        let n = 64;
        for j in 0..n {
            for i in 0..n {
                let p = Point2f::new((i as f32 + 0.5) / n as f32, (j as f32 + 0.5) / n as f32);
                sum += d.pdf(&p) as f64;
            }
        }
        let integral = sum / (n * n) as f64;
        assert!((integral - 1.0).abs() < 0.01, "integral = {}", integral);
    }
}
