//! Built-in scenes used by the command-line shell, the tests and the
//! examples. They stand in for a full scene-description loader.

use std::sync::Arc;

use crate::bvh::Bvh;
use crate::integrator::hierarchical::SubsurfaceObject;
use crate::light::{AreaLight, DiffuseAreaLight, InfiniteAreaLight, Light, PointLight};
use crate::material::{
    GlassMaterial, Material, MatteMaterial, MirrorMaterial, PlasticMaterial, SubsurfaceMaterial,
};
use crate::medium::{HomogeneousMedium, Medium, MediumInterface};
use crate::primitive::{GeometricPrimitive, Primitive};
use crate::scene::Scene;
use crate::shapes::{Quad, Shape, Sphere};
use crate::spectrum::Spectrum;
use crate::texture::CheckerboardTexture;
use crate::transform::Transform;
use crate::{Point3f, Vector3f};

fn add(
    prims: &mut Vec<Arc<dyn Primitive>>,
    shape: Arc<dyn Shape>,
    material: Arc<dyn Material>,
) {
    prims.push(Arc::new(GeometricPrimitive::new(shape, material)));
}

fn add_emitter(
    prims: &mut Vec<Arc<dyn Primitive>>,
    lights: &mut Vec<Arc<dyn Light>>,
    shape: Arc<dyn Shape>,
    material: Arc<dyn Material>,
    l_emit: Spectrum,
) {
    let light: Arc<DiffuseAreaLight> =
        Arc::new(DiffuseAreaLight::new(l_emit, Arc::clone(&shape), false));
    let area: Arc<dyn AreaLight> = light.clone();
    prims.push(Arc::new(
        GeometricPrimitive::new(shape, material).with_light(area),
    ));
    lights.push(light);
}

/// The classic box: white walls, red and green sides, a quad light in the
/// ceiling, a mirror ball and a glass ball.
pub fn cornell_box() -> Scene {
    let mut prims: Vec<Arc<dyn Primitive>> = Vec::new();
    let mut lights: Vec<Arc<dyn Light>> = Vec::new();

    let white: Arc<dyn Material> = Arc::new(MatteMaterial::constant(Spectrum::grey(0.75)));
    let red: Arc<dyn Material> =
        Arc::new(MatteMaterial::constant(Spectrum::rgb(0.75, 0.25, 0.25)));
    let green: Arc<dyn Material> =
        Arc::new(MatteMaterial::constant(Spectrum::rgb(0.25, 0.75, 0.25)));

    // Floor, ceiling, back wall; all normals face into the box
    add(
        &mut prims,
        Arc::new(Quad::new(
            Point3f::new(-1.0, -1.0, -1.0),
            Vector3f::new(2.0, 0.0, 0.0),
            Vector3f::new(0.0, 0.0, 2.0),
        )),
        Arc::clone(&white),
    );
    add(
        &mut prims,
        Arc::new(Quad::new(
            Point3f::new(-1.0, 1.0, -1.0),
            Vector3f::new(0.0, 0.0, 2.0),
            Vector3f::new(2.0, 0.0, 0.0),
        )),
        Arc::clone(&white),
    );
    add(
        &mut prims,
        Arc::new(Quad::new(
            Point3f::new(-1.0, -1.0, 1.0),
            Vector3f::new(2.0, 0.0, 0.0),
            Vector3f::new(0.0, 2.0, 0.0),
        )),
        Arc::clone(&white),
    );
    // Left (red) and right (green) walls
    add(
        &mut prims,
        Arc::new(Quad::new(
            Point3f::new(-1.0, -1.0, -1.0),
            Vector3f::new(0.0, 2.0, 0.0),
            Vector3f::new(0.0, 0.0, 2.0),
        )),
        red,
    );
    add(
        &mut prims,
        Arc::new(Quad::new(
            Point3f::new(1.0, -1.0, -1.0),
            Vector3f::new(0.0, 0.0, 2.0),
            Vector3f::new(0.0, 2.0, 0.0),
        )),
        green,
    );

    // Ceiling light, slightly below the ceiling; edge order makes the
    // normal face down into the box
    add_emitter(
        &mut prims,
        &mut lights,
        Arc::new(Quad::new(
            Point3f::new(-0.25, 0.99, -0.25),
            Vector3f::new(0.5, 0.0, 0.0),
            Vector3f::new(0.0, 0.0, 0.5),
        )),
        Arc::clone(&white),
        Spectrum::grey(12.0),
    );

    // Mirror ball on the left, glass ball on the right
    add(
        &mut prims,
        Arc::new(Sphere::new(
            Transform::translate(&Vector3f::new(-0.45, -0.7, 0.2)),
            0.3,
            false,
        )),
        Arc::new(MirrorMaterial::constant(Spectrum::grey(0.95))),
    );
    add(
        &mut prims,
        Arc::new(Sphere::new(
            Transform::translate(&Vector3f::new(0.45, -0.7, -0.2)),
            0.3,
            false,
        )),
        Arc::new(GlassMaterial::smooth(1.5)),
    );

    let bvh: Arc<dyn Primitive> = Arc::new(Bvh::new(4, prims));
    Scene::new(bvh, lights)
}

/// A perfectly diffuse unit sphere in a uniform radiance field. Any
/// energy-conserving integrator must reproduce the field exactly.
pub fn white_furnace() -> Scene {
    let mut prims: Vec<Arc<dyn Primitive>> = Vec::new();
    add(
        &mut prims,
        Arc::new(Sphere::new(Transform::default(), 1.0, false)),
        Arc::new(MatteMaterial::constant(Spectrum::white())),
    );
    let env: Arc<dyn Light> = Arc::new(InfiniteAreaLight::constant(Spectrum::white()));
    let bvh: Arc<dyn Primitive> = Arc::new(Bvh::new(4, prims));
    Scene::new(bvh, vec![env])
}

/// Point light above a glass sphere over a diffuse floor: a caustic focus
/// below the sphere that only light-tracing methods resolve quickly.
pub fn caustic() -> Scene {
    let mut prims: Vec<Arc<dyn Primitive>> = Vec::new();

    add(
        &mut prims,
        Arc::new(Quad::new(
            Point3f::new(-4.0, 0.0, -4.0),
            Vector3f::new(8.0, 0.0, 0.0),
            Vector3f::new(0.0, 0.0, 8.0),
        )),
        Arc::new(MatteMaterial::constant(Spectrum::grey(0.7))),
    );
    add(
        &mut prims,
        Arc::new(Sphere::new(
            Transform::translate(&Vector3f::new(0.0, 1.2, 0.0)),
            0.8,
            false,
        )),
        Arc::new(GlassMaterial::smooth(1.5)),
    );

    let lights: Vec<Arc<dyn Light>> = vec![Arc::new(PointLight::new(
        Point3f::new(0.0, 4.5, 0.0),
        Spectrum::grey(40.0),
    ))];
    let bvh: Arc<dyn Primitive> = Arc::new(Bvh::new(4, prims));
    Scene::new(bvh, lights)
}

/// Glass ball filled with a thin scattering medium over a checkered plane,
/// lit by a gradient environment.
pub fn glass_ball() -> Scene {
    let mut prims: Vec<Arc<dyn Primitive>> = Vec::new();

    let checker: Arc<dyn crate::texture::Texture<Spectrum>> = Arc::new(
        CheckerboardTexture::new(Spectrum::grey(0.8), Spectrum::grey(0.1), 16.0, 16.0),
    );
    add(
        &mut prims,
        Arc::new(Quad::new(
            Point3f::new(-6.0, 0.0, -6.0),
            Vector3f::new(12.0, 0.0, 0.0),
            Vector3f::new(0.0, 0.0, 12.0),
        )),
        Arc::new(MatteMaterial::new(checker)),
    );

    let interior: Arc<dyn Medium> = Arc::new(HomogeneousMedium::new(
        Spectrum::grey(0.02),
        Spectrum::grey(0.08),
        0.2,
    ));
    let sphere = Arc::new(Sphere::new(
        Transform::translate(&Vector3f::new(0.0, 1.0, 0.0)),
        1.0,
        false,
    ));
    prims.push(Arc::new(
        GeometricPrimitive::new(sphere, Arc::new(GlassMaterial::smooth(1.5)))
            .with_medium_interface(MediumInterface::new(Some(interior), None)),
    ));

    // Vertical gradient environment: bright zenith, dim horizon
    let (w, h) = (16usize, 8usize);
    let mut texels = Vec::with_capacity(w * h);
    for v in 0..h {
        let t = v as f32 / (h - 1) as f32;
        for _u in 0..w {
            texels.push(Spectrum::rgb(
                0.4 + 0.5 * (1.0 - t),
                0.5 + 0.4 * (1.0 - t),
                0.7 + 0.3 * (1.0 - t),
            ));
        }
    }
    let env: Arc<dyn Light> = Arc::new(InfiniteAreaLight::new(
        Transform::rotate_x(-90.0),
        w,
        h,
        texels,
    ));

    let bvh: Arc<dyn Primitive> = Arc::new(Bvh::new(4, prims));
    Scene::new(bvh, vec![env])
}

/// Translucent sphere under an area light, for the hierarchical subsurface
/// integrator. Also returns the object description the cache needs.
pub fn subsurface() -> (Scene, SubsurfaceObject) {
    let mut prims: Vec<Arc<dyn Primitive>> = Vec::new();
    let mut lights: Vec<Arc<dyn Light>> = Vec::new();

    add(
        &mut prims,
        Arc::new(Quad::new(
            Point3f::new(-4.0, 0.0, -4.0),
            Vector3f::new(8.0, 0.0, 0.0),
            Vector3f::new(0.0, 0.0, 8.0),
        )),
        Arc::new(MatteMaterial::constant(Spectrum::grey(0.5))),
    );

    let sigma_a = Spectrum::rgb(0.0021, 0.0041, 0.0071);
    let sigma_s = Spectrum::rgb(2.55, 3.21, 3.77);
    let sss_sphere: Arc<dyn Shape> = Arc::new(Sphere::new(
        Transform::translate(&Vector3f::new(0.0, 1.0, 0.0)),
        1.0,
        false,
    ));
    add(
        &mut prims,
        Arc::clone(&sss_sphere),
        Arc::new(SubsurfaceMaterial::new(1.0, sigma_a, sigma_s, 0.0, 1.3)),
    );

    add_emitter(
        &mut prims,
        &mut lights,
        Arc::new(Quad::new(
            Point3f::new(-1.0, 4.0, -1.0),
            Vector3f::new(2.0, 0.0, 0.0),
            Vector3f::new(0.0, 0.0, 2.0),
        )),
        Arc::new(MatteMaterial::constant(Spectrum::black())),
        Spectrum::grey(8.0),
    );

    let object = SubsurfaceObject {
        shapes: vec![sss_sphere],
        sigma_a,
        sigma_s,
        g: 0.0,
        eta: 1.3,
    };

    let bvh: Arc<dyn Primitive> = Arc::new(Bvh::new(4, prims));
    (Scene::new(bvh, lights), object)
}

/// A rough-plastic sphere under the gradient environment, exercising the
/// microfacet lobes.
pub fn plastic_sphere() -> Scene {
    let mut prims: Vec<Arc<dyn Primitive>> = Vec::new();
    add(
        &mut prims,
        Arc::new(Sphere::new(Transform::default(), 1.0, false)),
        Arc::new(PlasticMaterial::constant(
            Spectrum::rgb(0.4, 0.1, 0.1),
            Spectrum::grey(0.6),
            0.1,
        )),
    );
    let env: Arc<dyn Light> = Arc::new(InfiniteAreaLight::constant(Spectrum::grey(0.8)));
    let bvh: Arc<dyn Primitive> = Arc::new(Bvh::new(4, prims));
    Scene::new(bvh, vec![env])
}

/// Camera placements matched to the scenes above.
pub mod cameras {
    use std::sync::Arc;

    use crate::camera::PerspectiveCamera;
    use crate::film::Film;
    use crate::{Point3f, Vector3f};

    pub fn cornell_box(film: Arc<Film>) -> PerspectiveCamera {
        PerspectiveCamera::look_at(
            Point3f::new(0.0, 0.0, -3.9),
            Point3f::new(0.0, 0.0, 0.0),
            Vector3f::new(0.0, 1.0, 0.0),
            32.0,
            film,
        )
    }

    pub fn white_furnace(film: Arc<Film>) -> PerspectiveCamera {
        PerspectiveCamera::look_at(
            Point3f::new(0.0, 0.0, -4.0),
            Point3f::new(0.0, 0.0, 0.0),
            Vector3f::new(0.0, 1.0, 0.0),
            35.0,
            film,
        )
    }

    pub fn caustic(film: Arc<Film>) -> PerspectiveCamera {
        PerspectiveCamera::look_at(
            Point3f::new(0.0, 2.5, -5.0),
            Point3f::new(0.0, 0.8, 0.0),
            Vector3f::new(0.0, 1.0, 0.0),
            40.0,
            film,
        )
    }

    pub fn glass_ball(film: Arc<Film>) -> PerspectiveCamera {
        PerspectiveCamera::look_at(
            Point3f::new(0.0, 2.0, -4.5),
            Point3f::new(0.0, 1.0, 0.0),
            Vector3f::new(0.0, 1.0, 0.0),
            38.0,
            film,
        )
    }

    pub fn subsurface(film: Arc<Film>) -> PerspectiveCamera {
        PerspectiveCamera::look_at(
            Point3f::new(0.0, 2.0, -4.0),
            Point3f::new(0.0, 1.0, 0.0),
            Vector3f::new(0.0, 1.0, 0.0),
            38.0,
            film,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ray::Ray;

    #[test]
    fn test_cornell_box_closed() {
        let scene = cornell_box();
        // Rays from the center must hit geometry in every axis direction
        for d in &[
            Vector3f::new(1.0, 0.0, 0.0),
            Vector3f::new(-1.0, 0.0, 0.0),
            Vector3f::new(0.0, 1.0, 0.0),
            Vector3f::new(0.0, -1.0, 0.0),
            Vector3f::new(0.0, 0.0, 1.0),
        ] {
            let mut ray = Ray::new(Point3f::new(0.0, 0.0, 0.0), *d);
            assert!(
                scene.intersect(&mut ray).is_some(),
                "escaped along {:?}",
                d
            );
        }
        assert_eq!(scene.lights.len(), 1);
    }

    #[test]
    fn test_furnace_has_infinite_light() {
        let scene = white_furnace();
        assert_eq!(scene.infinite_lights.len(), 1);
        let mut ray = Ray::new(Point3f::new(0.0, 0.0, -3.0), Vector3f::new(0.0, 0.0, 1.0));
        assert!(scene.intersect(&mut ray).is_some());
    }
}
