use std::f32::consts::PI;
use std::sync::Arc;

use crate::bounds::Bounds2f;
use crate::film::Film;
use crate::interaction::Interaction;
use crate::light::VisibilityTester;
use crate::ray::Ray;
use crate::sampler::CameraSample;
use crate::sampling::concentric_sample_disk;
use crate::spectrum::Spectrum;
use crate::transform::Transform;
use crate::{Point2f, Point3f, Vector3f};

/// Camera interface. The importance-emission half (`we`, `pdf_we`,
/// `sample_wi`) is what lets the bidirectional integrators treat the camera
/// as just another path endpoint.
pub trait Camera: Send + Sync {
    /// Generate the primary ray for a film/lens sample, with its weight.
    fn generate_ray(&self, sample: &CameraSample) -> (Ray, f32);

    /// Importance the camera emits along this ray, and the raster position
    /// it corresponds to.
    fn we(&self, ray: &Ray) -> (Spectrum, Option<Point2f>);

    /// (positional pdf, directional pdf) of emitting this ray.
    fn pdf_we(&self, ray: &Ray) -> (f32, f32);

    /// Sample an incident direction connecting `re` to the lens. Returns
    /// (importance, wi, pdf, raster position, visibility tester).
    fn sample_wi(
        &self,
        re: &Interaction,
        u: Point2f,
    ) -> (Spectrum, Vector3f, f32, Option<Point2f>, VisibilityTester);

    fn film(&self) -> &Arc<Film>;
}

/// Thin-lens perspective camera.
pub struct PerspectiveCamera {
    camera_to_world: Transform,
    raster_to_camera: Transform,
    world_to_raster: Transform,
    lens_radius: f32,
    focal_distance: f32,
    /// Area of the virtual film at z=1 in camera space
    area: f32,
    film: Arc<Film>,
}

impl PerspectiveCamera {
    pub fn new(
        camera_to_world: Transform,
        fov_deg: f32,
        lens_radius: f32,
        focal_distance: f32,
        film: Arc<Film>,
    ) -> PerspectiveCamera {
        let res = film.full_resolution;
        let aspect = res.x as f32 / res.y as f32;
        let screen = if aspect > 1.0 {
            Bounds2f::from_points(
                &Point2f::new(-aspect, -1.0),
                &Point2f::new(aspect, 1.0),
            )
        } else {
            Bounds2f::from_points(
                &Point2f::new(-1.0, -1.0 / aspect),
                &Point2f::new(1.0, 1.0 / aspect),
            )
        };

        let camera_to_screen = Transform::perspective(fov_deg, 1e-2, 1000.0);
        let screen_to_raster = Transform::scale(res.x as f32, res.y as f32, 1.0)
            * Transform::scale(
                1.0 / (screen.p_max.x - screen.p_min.x),
                1.0 / (screen.p_min.y - screen.p_max.y),
                1.0,
            )
            * Transform::translate(&Vector3f::new(-screen.p_min.x, -screen.p_max.y, 0.0));
        let raster_to_camera = camera_to_screen.inverse() * screen_to_raster.inverse();
        let world_to_raster =
            screen_to_raster * camera_to_screen * camera_to_world.inverse();

        // Film area projected to the z=1 plane, for the importance
        // normalization
        let mut p_min = raster_to_camera.transform_point(&Point3f::new(0.0, 0.0, 0.0));
        let mut p_max =
            raster_to_camera.transform_point(&Point3f::new(res.x as f32, res.y as f32, 0.0));
        p_min = p_min / p_min.z;
        p_max = p_max / p_max.z;
        let area = ((p_max.x - p_min.x) * (p_max.y - p_min.y)).abs();

        PerspectiveCamera {
            camera_to_world,
            raster_to_camera,
            world_to_raster,
            lens_radius,
            focal_distance,
            area,
            film,
        }
    }

    /// Convenience constructor: look-at camera without depth of field.
    pub fn look_at(
        eye: Point3f,
        look: Point3f,
        up: Vector3f,
        fov_deg: f32,
        film: Arc<Film>,
    ) -> PerspectiveCamera {
        PerspectiveCamera::new(
            Transform::look_at(&eye, &look, &up),
            fov_deg,
            0.0,
            1e6,
            film,
        )
    }

    fn lens_area(&self) -> f32 {
        if self.lens_radius > 0.0 {
            PI * self.lens_radius * self.lens_radius
        } else {
            1.0
        }
    }
}

impl Camera for PerspectiveCamera {
    fn generate_ray(&self, sample: &CameraSample) -> (Ray, f32) {
        let p_film = Point3f::new(sample.p_film.x, sample.p_film.y, 0.0);
        let p_camera = self.raster_to_camera.transform_point(&p_film);
        let mut o = Point3f::new(0.0, 0.0, 0.0);
        let mut d = Vector3f::from(p_camera).normalize();

        if self.lens_radius > 0.0 {
            // Defocus: shift the origin on the lens, retarget through the
            // plane of focus
            let p_lens = self.lens_radius * concentric_sample_disk(sample.p_lens);
            let ft = self.focal_distance / d.z;
            let p_focus = o + d * ft;
            o = Point3f::new(p_lens.x, p_lens.y, 0.0);
            d = (p_focus - o).normalize();
        }

        let ray = Ray::new(
            self.camera_to_world.transform_point(&o),
            self.camera_to_world.transform_vector(&d).normalize(),
        );
        (ray, 1.0)
    }

    fn we(&self, ray: &Ray) -> (Spectrum, Option<Point2f>) {
        // Forward axis in world space
        let forward = self
            .camera_to_world
            .transform_vector(&Vector3f::new(0.0, 0.0, 1.0));
        let cos_theta = ray.d.dot(&forward);
        if cos_theta <= 0.0 {
            return (Spectrum::black(), None);
        }

        // Map the ray to its raster position through the plane of focus
        let t = if self.lens_radius > 0.0 {
            self.focal_distance
        } else {
            1.0
        } / cos_theta;
        let p_focus = ray.at(t);
        let p_raster3 = self.world_to_raster.transform_point(&p_focus);
        let p_raster = Point2f::new(p_raster3.x, p_raster3.y);

        let res = self.film.full_resolution;
        if p_raster.x < 0.0
            || p_raster.x >= res.x as f32
            || p_raster.y < 0.0
            || p_raster.y >= res.y as f32
        {
            return (Spectrum::black(), None);
        }

        let cos2 = cos_theta * cos_theta;
        let w = 1.0 / (self.area * self.lens_area() * cos2 * cos2);
        (Spectrum::grey(w), Some(p_raster))
    }

    fn pdf_we(&self, ray: &Ray) -> (f32, f32) {
        let forward = self
            .camera_to_world
            .transform_vector(&Vector3f::new(0.0, 0.0, 1.0));
        let cos_theta = ray.d.dot(&forward);
        if cos_theta <= 0.0 {
            return (0.0, 0.0);
        }
        let t = if self.lens_radius > 0.0 {
            self.focal_distance
        } else {
            1.0
        } / cos_theta;
        let p_focus = ray.at(t);
        let p_raster3 = self.world_to_raster.transform_point(&p_focus);
        let res = self.film.full_resolution;
        if p_raster3.x < 0.0
            || p_raster3.x >= res.x as f32
            || p_raster3.y < 0.0
            || p_raster3.y >= res.y as f32
        {
            return (0.0, 0.0);
        }
        (
            1.0 / self.lens_area(),
            1.0 / (self.area * cos_theta * cos_theta * cos_theta),
        )
    }

    fn sample_wi(
        &self,
        re: &Interaction,
        u: Point2f,
    ) -> (Spectrum, Vector3f, f32, Option<Point2f>, VisibilityTester) {
        let p_lens = self.lens_radius * concentric_sample_disk(u);
        let p_lens_world = self
            .camera_to_world
            .transform_point(&Point3f::new(p_lens.x, p_lens.y, 0.0));
        let lens_n = self
            .camera_to_world
            .transform_normal(&crate::Normal3f::new(0.0, 0.0, 1.0));
        let lens_intr = Interaction::new(
            p_lens_world,
            Vector3f::new(0.0, 0.0, 0.0),
            Vector3f::from(lens_n),
            lens_n,
        );

        let d = p_lens_world - re.p;
        let dist = d.length();
        if dist == 0.0 {
            return (
                Spectrum::black(),
                Vector3f::new(0.0, 0.0, 1.0),
                0.0,
                None,
                VisibilityTester::new(*re, lens_intr),
            );
        }
        let wi = d / dist;
        let cos = lens_n.dotv(&-wi).abs();
        let pdf = (dist * dist) / (cos * self.lens_area());

        let (importance, p_raster) = self.we(&Ray::new(p_lens_world, -wi));
        let vis = VisibilityTester::new(*re, lens_intr);
        (importance, wi, pdf, p_raster, vis)
    }

    fn film(&self) -> &Arc<Film> {
        &self.film
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::BoxFilter;
    use crate::Point2i;

    fn test_camera() -> PerspectiveCamera {
        let film = Arc::new(Film::new(Point2i::new(64, 48), Arc::new(BoxFilter)));
        PerspectiveCamera::look_at(
            Point3f::new(0.0, 0.0, -5.0),
            Point3f::new(0.0, 0.0, 0.0),
            Vector3f::new(0.0, 1.0, 0.0),
            45.0,
            film,
        )
    }

    #[test]
    fn test_center_ray_points_forward() {
        let cam = test_camera();
        let s = CameraSample {
            p_film: Point2f::new(32.0, 24.0),
            p_lens: Point2f::new(0.5, 0.5),
        };
        let (ray, weight) = cam.generate_ray(&s);
        assert_eq!(weight, 1.0);
        assert!((ray.d.z - 1.0).abs() < 1e-4, "d = {:?}", ray.d);
        assert!((ray.o.z + 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_we_roundtrip() {
        // A generated ray maps back to (approximately) its film position.
        let cam = test_camera();
        let s = CameraSample {
            p_film: Point2f::new(10.25, 30.75),
            p_lens: Point2f::new(0.5, 0.5),
        };
        let (ray, _) = cam.generate_ray(&s);
        let (w, p_raster) = cam.we(&ray);
        assert!(!w.is_black());
        let p = p_raster.expect("on film");
        assert!((p.x - 10.25).abs() < 0.05, "p = {:?}", p);
        assert!((p.y - 30.75).abs() < 0.05, "p = {:?}", p);
    }

    #[test]
    fn test_backward_ray_no_importance() {
        let cam = test_camera();
        let ray = Ray::new(Point3f::new(0.0, 0.0, -5.0), Vector3f::new(0.0, 0.0, -1.0));
        let (w, p) = cam.we(&ray);
        assert!(w.is_black());
        assert!(p.is_none());
    }
}
