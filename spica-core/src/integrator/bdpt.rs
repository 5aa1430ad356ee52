use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use bumpalo::Bump;
use log::info;
use parking_lot::Mutex;

use crate::bounds::Bounds2i;
use crate::bsdf::BxDFType;
use crate::camera::Camera;
use crate::interaction::{Interaction, MediumInteraction, SurfaceInteraction};
use crate::light::{is_delta_light, Light, LightFlags, VisibilityTester};
use crate::material::TransportMode;
use crate::ray::Ray;
use crate::renderer::{checkpoint_path, RenderOptions};
use crate::sampler::Sampler;
use crate::sampling::Distribution1D;
use crate::scene::Scene;
use crate::spectrum::Spectrum;
use crate::{Normal3f, Point2f, Point2i, Vector3f};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VertexType {
    Camera,
    Light,
    Surface,
    Medium,
}

/// One vertex of a camera or light subpath, carrying the throughput up to it
/// and the forward/reverse area densities used by the MIS weight.
#[derive(Clone)]
pub struct Vertex<'s, 'a> {
    pub vtype: VertexType,
    pub beta: Spectrum,
    /// Endpoint backrefs; exactly one of these is set for endpoint vertices
    camera: Option<&'s dyn Camera>,
    light: Option<&'s dyn Light>,
    si: Option<SurfaceInteraction<'s, 'a>>,
    mi: Option<MediumInteraction>,
    /// Base geometric record shared by all vertex kinds
    base: Interaction,
    pub delta: bool,
    pub pdf_fwd: f32,
    pub pdf_rev: f32,
}

impl<'s, 'a> Vertex<'s, 'a> {
    fn camera_vertex(camera: &'s dyn Camera, ray: &Ray, beta: Spectrum) -> Vertex<'s, 'a> {
        Vertex {
            vtype: VertexType::Camera,
            beta,
            camera: Some(camera),
            light: None,
            si: None,
            mi: None,
            base: Interaction::from_point(&ray.o),
            delta: false,
            pdf_fwd: 0.0,
            pdf_rev: 0.0,
        }
    }

    fn camera_vertex_at(
        camera: &'s dyn Camera,
        it: Interaction,
        beta: Spectrum,
    ) -> Vertex<'s, 'a> {
        Vertex {
            vtype: VertexType::Camera,
            beta,
            camera: Some(camera),
            light: None,
            si: None,
            mi: None,
            base: it,
            delta: false,
            pdf_fwd: 0.0,
            pdf_rev: 0.0,
        }
    }

    fn light_vertex(
        light: &'s dyn Light,
        ray: &Ray,
        n_light: Normal3f,
        le: Spectrum,
        pdf: f32,
    ) -> Vertex<'s, 'a> {
        let mut base = Interaction::from_point(&ray.o);
        base.n = n_light;
        Vertex {
            vtype: VertexType::Light,
            beta: le,
            camera: None,
            light: Some(light),
            si: None,
            mi: None,
            base,
            delta: false,
            pdf_fwd: pdf,
            pdf_rev: 0.0,
        }
    }

    fn light_vertex_at(
        light: Option<&'s dyn Light>,
        it: Interaction,
        beta: Spectrum,
        pdf_fwd: f32,
    ) -> Vertex<'s, 'a> {
        Vertex {
            vtype: VertexType::Light,
            beta,
            camera: None,
            light,
            si: None,
            mi: None,
            base: it,
            delta: false,
            pdf_fwd,
            pdf_rev: 0.0,
        }
    }

    /// A ray that escaped toward the environment, treated as a vertex on the
    /// infinite light.
    fn escaped_ray(ray: &Ray, beta: Spectrum, pdf_fwd: f32) -> Vertex<'s, 'a> {
        let mut base = Interaction::from_point(&(ray.o + ray.d));
        base.wo = -ray.d;
        Vertex {
            vtype: VertexType::Light,
            beta,
            camera: None,
            light: None,
            si: None,
            mi: None,
            base,
            delta: false,
            pdf_fwd,
            pdf_rev: 0.0,
        }
    }

    fn surface_vertex(
        si: SurfaceInteraction<'s, 'a>,
        beta: Spectrum,
        pdf_fwd: f32,
        prev: &Vertex<'s, 'a>,
    ) -> Vertex<'s, 'a> {
        let base = si.hit;
        let mut v = Vertex {
            vtype: VertexType::Surface,
            beta,
            camera: None,
            light: None,
            si: Some(si),
            mi: None,
            base,
            delta: false,
            pdf_fwd: 0.0,
            pdf_rev: 0.0,
        };
        v.pdf_fwd = prev.convert_density(pdf_fwd, &v);
        v
    }

    fn medium_vertex(
        mi: MediumInteraction,
        beta: Spectrum,
        pdf_fwd: f32,
        prev: &Vertex<'s, 'a>,
    ) -> Vertex<'s, 'a> {
        let base = mi.as_interaction();
        let mut v = Vertex {
            vtype: VertexType::Medium,
            beta,
            camera: None,
            light: None,
            si: None,
            mi: Some(mi),
            base,
            delta: false,
            pdf_fwd: 0.0,
            pdf_rev: 0.0,
        };
        v.pdf_fwd = prev.convert_density(pdf_fwd, &v);
        v
    }

    pub fn p(&self) -> crate::Point3f {
        self.base.p
    }

    pub fn ng(&self) -> Normal3f {
        self.base.n
    }

    pub fn ns(&self) -> Normal3f {
        match self.si {
            Some(ref si) => si.shading.n,
            None => self.base.n,
        }
    }

    pub fn is_on_surface(&self) -> bool {
        self.ng() != Normal3f::new(0.0, 0.0, 0.0)
    }

    pub fn is_light(&self) -> bool {
        match self.vtype {
            VertexType::Light => true,
            VertexType::Surface => self
                .si
                .as_ref()
                .and_then(|si| si.primitive)
                .and_then(|p| p.area_light())
                .is_some(),
            _ => false,
        }
    }

    pub fn is_delta_light(&self) -> bool {
        self.vtype == VertexType::Light
            && self.light.map(|l| is_delta_light(l.flags())).unwrap_or(false)
    }

    pub fn is_infinite_light(&self) -> bool {
        self.vtype == VertexType::Light
            && (self.light.is_none()
                || self
                    .light
                    .map(|l| l.flags().contains(LightFlags::INFINITE))
                    .unwrap_or(false))
    }

    pub fn is_connectible(&self) -> bool {
        match self.vtype {
            VertexType::Medium => true,
            VertexType::Light => !self
                .light
                .map(|l| l.flags().contains(LightFlags::DELTA_DIRECTION))
                .unwrap_or(false),
            VertexType::Camera => true,
            VertexType::Surface => self
                .si
                .as_ref()
                .and_then(|si| si.bsdf.as_ref())
                .map(|b| b.num_components(BxDFType::all() & !BxDFType::BSDF_SPECULAR) > 0)
                .unwrap_or(false),
        }
    }

    /// Scattering response toward `next`.
    pub fn f(&self, next: &Vertex<'s, 'a>, _mode: TransportMode) -> Spectrum {
        let mut wi = next.p() - self.p();
        if wi.length_squared() == 0.0 {
            return Spectrum::black();
        }
        wi = wi.normalize();
        match self.vtype {
            VertexType::Surface => {
                let si = self.si.as_ref().unwrap();
                match si.bsdf {
                    Some(ref bsdf) => bsdf.f(&si.hit.wo, &wi, BxDFType::all()),
                    None => Spectrum::black(),
                }
            }
            VertexType::Medium => {
                let mi = self.mi.as_ref().unwrap();
                Spectrum::grey(mi.phase.p(&mi.wo, &wi))
            }
            _ => Spectrum::black(),
        }
    }

    /// Emitted radiance toward `v`, for s = 0 strategies.
    pub fn le(&self, scene: &Scene, v: &Vertex<'s, 'a>) -> Spectrum {
        if !self.is_light() {
            return Spectrum::black();
        }
        let mut w = v.p() - self.p();
        if w.length_squared() == 0.0 {
            return Spectrum::black();
        }
        w = w.normalize();
        if self.is_infinite_light() {
            let ray = Ray::new(self.p(), -w);
            scene
                .infinite_lights
                .iter()
                .fold(Spectrum::black(), |acc, l| acc + l.le(&ray))
        } else {
            self.si
                .as_ref()
                .and_then(|si| si.primitive)
                .and_then(|p| p.area_light())
                .map(|light| light.l(&self.base, &w))
                .unwrap_or_else(Spectrum::black)
        }
    }

    /// Convert a solid-angle density at this vertex into an area density at
    /// `next`.
    pub fn convert_density(&self, pdf: f32, next: &Vertex<'s, 'a>) -> f32 {
        if next.is_infinite_light() {
            return pdf;
        }
        let w = next.p() - self.p();
        let dist2 = w.length_squared();
        if dist2 == 0.0 {
            return 0.0;
        }
        let inv_dist2 = 1.0 / dist2;
        let mut pdf = pdf * inv_dist2;
        if next.is_on_surface() {
            pdf *= next.ng().dotv(&(w * inv_dist2.sqrt())).abs();
        }
        pdf
    }

    /// Area density of this vertex generating `next`, given the previous
    /// vertex along the path.
    pub fn pdf(
        &self,
        scene: &Scene,
        prev: Option<&Vertex<'s, 'a>>,
        next: &Vertex<'s, 'a>,
    ) -> f32 {
        if self.vtype == VertexType::Light {
            return self.pdf_light(scene, next);
        }
        let mut wn = next.p() - self.p();
        if wn.length_squared() == 0.0 {
            return 0.0;
        }
        wn = wn.normalize();
        let wp = prev.map(|prev| {
            let w = prev.p() - self.p();
            w.normalize()
        });

        let pdf_solid = match self.vtype {
            VertexType::Camera => {
                let camera = self.camera.unwrap();
                let (_pdf_pos, pdf_dir) = camera.pdf_we(&Ray::new(self.p(), wn));
                pdf_dir
            }
            VertexType::Surface => {
                let si = self.si.as_ref().unwrap();
                let wp = wp.expect("surface vertex pdf needs a predecessor");
                match si.bsdf {
                    Some(ref bsdf) => bsdf.pdf(&wp, &wn, BxDFType::all()),
                    None => 0.0,
                }
            }
            VertexType::Medium => {
                let mi = self.mi.as_ref().unwrap();
                let wp = wp.expect("medium vertex pdf needs a predecessor");
                mi.phase.p(&wp, &wn)
            }
            VertexType::Light => unreachable!(),
        };

        self.convert_density(pdf_solid, next)
    }

    /// Area density of this light vertex emitting toward `v`.
    pub fn pdf_light(&self, scene: &Scene, v: &Vertex<'s, 'a>) -> f32 {
        let mut w = v.p() - self.p();
        let dist2 = w.length_squared();
        if dist2 == 0.0 {
            return 0.0;
        }
        let inv_dist2 = 1.0 / dist2;
        w = w.normalize();

        let mut pdf = if self.is_infinite_light() {
            // Density over the world-bounding disk
            let (_, world_radius) = scene.world_bounds().bounding_sphere();
            1.0 / (std::f32::consts::PI * world_radius * world_radius)
        } else {
            let pdf_dir = self
                .light_pdf_le(scene, &Ray::new(self.p(), w))
                .map(|(_pp, pd, _idx)| pd)
                .unwrap_or(0.0);
            pdf_dir * inv_dist2
        };
        if v.is_on_surface() {
            pdf *= v.ng().dotv(&w).abs();
        }
        pdf
    }

    /// Discrete * positional density of this vertex being the origin of a
    /// light subpath.
    pub fn pdf_light_origin(
        &self,
        scene: &Scene,
        v: &Vertex<'s, 'a>,
        light_distr: &Distribution1D,
    ) -> f32 {
        let mut w = v.p() - self.p();
        if w.length_squared() == 0.0 {
            return 0.0;
        }
        w = w.normalize();
        if self.is_infinite_light() {
            return infinite_light_density(scene, light_distr, &-w);
        }
        match self.light_pdf_le(scene, &Ray::new(self.p(), w)) {
            Some((pdf_pos, _pdf_dir, index)) => pdf_pos * light_distr.discrete_pdf(index),
            None => 0.0,
        }
    }

    /// Emission pdfs of the light behind this vertex, whether it is a light
    /// endpoint or a surface vertex on an area light, plus the light's index
    /// in the scene's light list.
    fn light_pdf_le(&self, scene: &Scene, ray: &Ray) -> Option<(f32, f32, usize)> {
        if let Some(light) = self.light {
            let (pdf_pos, pdf_dir) = light.pdf_le(ray, &self.ng());
            let index = scene.lights.iter().position(|l| l.id() == light.id())?;
            return Some((pdf_pos, pdf_dir, index));
        }
        let area_light = self
            .si
            .as_ref()
            .and_then(|si| si.primitive)
            .and_then(|p| p.area_light())?;
        let (pdf_pos, pdf_dir) = area_light.pdf_le(ray, &self.ng());
        let index = scene
            .lights
            .iter()
            .position(|l| l.id() == area_light.id())?;
        Some((pdf_pos, pdf_dir, index))
    }
}

/// Density of sampling direction `w` toward the scene's infinite lights.
pub fn infinite_light_density(
    scene: &Scene,
    light_distr: &Distribution1D,
    w: &Vector3f,
) -> f32 {
    let mut pdf = 0.0;
    let dummy = Interaction::from_point(&crate::Point3f::new(0.0, 0.0, 0.0));
    for (i, light) in scene.lights.iter().enumerate() {
        if light.flags().contains(LightFlags::INFINITE) {
            pdf += light.pdf_li(&dummy, &-(*w)) * light_distr.func[i];
        }
    }
    pdf / (light_distr.func_int * light_distr.count() as f32)
}

/// Geometric coupling term between two vertices, including transmittance.
fn g(
    scene: &Scene,
    sampler: &mut dyn Sampler,
    v0: &Vertex<'_, '_>,
    v1: &Vertex<'_, '_>,
) -> Spectrum {
    let mut d = v0.p() - v1.p();
    let mut g = 1.0 / d.length_squared();
    d *= g.sqrt();
    if v0.is_on_surface() {
        g *= v0.ns().dotv(&d).abs();
    }
    if v1.is_on_surface() {
        g *= v1.ns().dotv(&d).abs();
    }
    let mut vis = VisibilityTester::new(v0.base, v1.base);
    vis.medium = match v0.vtype {
        VertexType::Medium => v0.mi.as_ref().and_then(|m| m.medium.clone()),
        VertexType::Surface => v0.si.as_ref().and_then(|si| si.medium_for(&-d)),
        _ => None,
    };
    vis.tr(scene, sampler) * g
}

/// Extend a subpath by sampling scattering at each vertex, recording
/// forward and reverse densities as it goes.
fn random_walk<'s: 'a, 'a>(
    scene: &'s Scene,
    ray: Ray,
    sampler: &mut dyn Sampler,
    arena: &'a Bump,
    beta: Spectrum,
    pdf: f32,
    max_depth: u32,
    mode: TransportMode,
    path: &mut Vec<Vertex<'s, 'a>>,
) -> usize {
    if max_depth == 0 {
        return 0;
    }
    let mut bounces = 0usize;
    let mut beta = beta;
    let mut ray = ray;
    let mut pdf_fwd = pdf;
    #[allow(unused_assignments)]
    let mut pdf_rev = 0.0;

    loop {
        let mut found = scene.intersect(&mut ray);

        // Medium scattering comes first
        let mut medium_interaction = None;
        if let Some(ref medium) = ray.medium {
            let (weight, ms) = medium.sample(&ray, sampler);
            beta *= weight;
            if let Some(ms) = ms {
                medium_interaction = Some(MediumInteraction::new(&ms, ray.medium.clone()));
            }
        }
        if beta.is_black() {
            break;
        }

        if let Some(mi) = medium_interaction {
            let phase = mi.phase;
            let wo = mi.wo;
            let vertex = Vertex::medium_vertex(mi.clone(), beta, pdf_fwd, path.last().unwrap());
            path.push(vertex);
            bounces += 1;
            if bounces as u32 >= max_depth {
                break;
            }
            let (wi, p) = phase.sample_p(&wo, sampler.get_2d());
            pdf_fwd = p;
            pdf_rev = p;
            ray = mi.spawn_ray(&wi);

            // Reverse area density at the predecessor
            let n = path.len();
            let prev_rev = path[n - 1].convert_density(pdf_rev, &path[n - 2]);
            path[n - 2].pdf_rev = prev_rev;
        } else {
            match found.take() {
                None => {
                    // Escaped rays become pseudo light vertices when tracing
                    // from the camera
                    if mode == TransportMode::Radiance {
                        path.push(Vertex::escaped_ray(&ray, beta, pdf_fwd));
                        bounces += 1;
                    }
                    break;
                }
                Some(mut isect) => {
                    isect.compute_scattering_functions(mode, arena);
                    if isect.bsdf.is_none() {
                        ray = isect.spawn_ray(&ray.d);
                        continue;
                    }
                    let bsdf = isect.bsdf.unwrap();
                    let wo = isect.hit.wo;
                    let shading_n = isect.shading.n;
                    let geo_n = isect.hit.n;

                    let vertex =
                        Vertex::surface_vertex(isect.clone(), beta, pdf_fwd, path.last().unwrap());
                    path.push(vertex);
                    bounces += 1;
                    if bounces as u32 >= max_depth {
                        break;
                    }

                    let (f, wi, pdf, flags) =
                        bsdf.sample_f(&wo, sampler.get_2d(), BxDFType::all());
                    if f.is_black() || pdf == 0.0 {
                        break;
                    }
                    pdf_fwd = pdf;
                    beta *= f * wi.dotn(&shading_n).abs() / pdf;
                    pdf_rev = bsdf.pdf(&wi, &wo, BxDFType::all());
                    if flags.contains(BxDFType::BSDF_SPECULAR) {
                        let n = path.len();
                        path[n - 1].delta = true;
                        pdf_rev = 0.0;
                        pdf_fwd = 0.0;
                    }
                    // Shading-normal correction keeps light and importance
                    // transport symmetric
                    beta *= correct_shading_normal(&wo, &wi, &shading_n, &geo_n, mode);
                    ray = isect.spawn_ray(&wi);

                    let n = path.len();
                    let prev_rev = path[n - 1].convert_density(pdf_rev, &path[n - 2]);
                    path[n - 2].pdf_rev = prev_rev;
                }
            }
        }
    }

    bounces
}

/// Correction factor for shading normals under importance transport.
fn correct_shading_normal(
    wo: &Vector3f,
    wi: &Vector3f,
    ns: &Normal3f,
    ng: &Normal3f,
    mode: TransportMode,
) -> f32 {
    if mode == TransportMode::Importance {
        let num = wo.dotn(ns).abs() * wi.dotn(ng).abs();
        let denom = wo.dotn(ng).abs() * wi.dotn(ns).abs();
        if denom == 0.0 {
            0.0
        } else {
            num / denom
        }
    } else {
        1.0
    }
}

/// Build the camera subpath for a film position. Returns the number of
/// vertices generated.
pub fn generate_camera_subpath<'s: 'a, 'a>(
    scene: &'s Scene,
    sampler: &mut dyn Sampler,
    arena: &'a Bump,
    max_depth: u32,
    camera: &'s dyn Camera,
    p_film: Point2f,
    path: &mut Vec<Vertex<'s, 'a>>,
) -> usize {
    if max_depth == 0 {
        return 0;
    }
    let camera_sample = crate::sampler::CameraSample {
        p_film,
        p_lens: sampler.get_2d(),
    };
    let (ray, ray_weight) = camera.generate_ray(&camera_sample);
    let beta = Spectrum::grey(ray_weight);
    path.push(Vertex::camera_vertex(camera, &ray, beta));
    let (_pdf_pos, pdf_dir) = camera.pdf_we(&ray);

    random_walk(
        scene,
        ray,
        sampler,
        arena,
        beta,
        pdf_dir,
        max_depth - 1,
        TransportMode::Radiance,
        path,
    ) + 1
}

/// Build the light subpath. Returns the number of vertices generated.
pub fn generate_light_subpath<'s: 'a, 'a>(
    scene: &'s Scene,
    sampler: &mut dyn Sampler,
    arena: &'a Bump,
    max_depth: u32,
    light_distr: &Distribution1D,
    path: &mut Vec<Vertex<'s, 'a>>,
) -> usize {
    if max_depth == 0 || scene.lights.is_empty() {
        return 0;
    }
    let (light_num, light_pdf) = light_distr.sample_discrete(sampler.get_1d());
    if light_pdf == 0.0 {
        return 0;
    }
    let light = &scene.lights[light_num];
    let u1 = sampler.get_2d();
    let u2 = sampler.get_2d();
    let (ray, n_light, pdf_pos, pdf_dir, le) = light.sample_le(u1, u2);
    if pdf_pos == 0.0 || pdf_dir == 0.0 || le.is_black() {
        return 0;
    }

    path.push(Vertex::light_vertex(
        &**light,
        &ray,
        n_light,
        le,
        pdf_pos * light_pdf,
    ));
    let beta = le * n_light.dotv(&ray.d).abs() / (light_pdf * pdf_pos * pdf_dir);
    let is_infinite = path[0].is_infinite_light();

    let n_vertices = random_walk(
        scene,
        ray.clone(),
        sampler,
        arena,
        beta,
        pdf_dir,
        max_depth - 1,
        TransportMode::Importance,
        path,
    );

    // Spatial densities for infinite lights are only known once the first
    // real vertex exists
    if is_infinite {
        if n_vertices > 0 {
            let mut pdf = pdf_pos;
            if path[1].is_on_surface() {
                pdf *= ray.d.dotn(&path[1].ng()).abs();
            }
            path[1].pdf_fwd = pdf;
        }
        path[0].pdf_fwd = infinite_light_density(scene, light_distr, &ray.d);
    }

    n_vertices + 1
}

/// Multiple importance sampling weight for strategy (s, t), computed from
/// the ratio products of hypothetical strategies over the same path.
#[allow(clippy::too_many_arguments)]
pub fn mis_weight<'s, 'a>(
    scene: &Scene,
    light_vertices: &[Vertex<'s, 'a>],
    camera_vertices: &[Vertex<'s, 'a>],
    sampled: Option<&Vertex<'s, 'a>>,
    s: usize,
    t: usize,
    light_distr: &Distribution1D,
) -> f32 {
    if s + t == 2 {
        return 1.0;
    }

    // Effective endpoint vertices for this strategy, with s=1/t=1 vertices
    // substituted by the dynamically sampled one
    let qs: Option<Vertex<'s, 'a>> = if s == 1 {
        sampled.cloned()
    } else if s > 0 {
        Some(light_vertices[s - 1].clone())
    } else {
        None
    };
    let pt: Option<Vertex<'s, 'a>> = if t == 1 {
        sampled.cloned()
    } else if t > 0 {
        Some(camera_vertices[t - 1].clone())
    } else {
        None
    };
    let qs_minus = if s > 1 { Some(&light_vertices[s - 2]) } else { None };
    let pt_minus = if t > 1 { Some(&camera_vertices[t - 2]) } else { None };

    // Reverse densities the hypothetical strategies would have used
    let pt_pdf_rev: Option<f32> = pt.as_ref().map(|pt_v| {
        if s > 0 {
            qs.as_ref().unwrap().pdf(scene, qs_minus, pt_v)
        } else {
            pt_v.pdf_light_origin(scene, pt_minus.unwrap(), light_distr)
        }
    });
    let pt_minus_pdf_rev: Option<f32> = pt_minus.map(|ptm| {
        let pt_v = pt.as_ref().unwrap();
        if s > 0 {
            pt_v.pdf(scene, qs.as_ref(), ptm)
        } else {
            pt_v.pdf_light(scene, ptm)
        }
    });
    let qs_pdf_rev: Option<f32> = qs.as_ref().map(|qs_v| {
        let pt_v = pt.as_ref().unwrap();
        pt_v.pdf(scene, pt_minus, qs_v)
    });
    let qs_minus_pdf_rev: Option<f32> = qs_minus.map(|qsm| {
        let qs_v = qs.as_ref().unwrap();
        qs_v.pdf(scene, pt.as_ref(), qsm)
    });

    let remap0 = |f: f32| if f != 0.0 { f } else { 1.0 };

    // Strategies along the camera subpath
    let mut sum_ri = 0.0;
    let mut ri = 1.0;
    let mut i = t as isize - 1;
    while i > 0 {
        let iu = i as usize;
        let (pdf_rev, pdf_fwd, delta_i) = if iu == t - 1 {
            (
                pt_pdf_rev.unwrap_or(0.0),
                pt.as_ref().map(|v| v.pdf_fwd).unwrap_or(0.0),
                false,
            )
        } else if iu == t - 2 {
            (
                pt_minus_pdf_rev.unwrap_or(0.0),
                camera_vertices[iu].pdf_fwd,
                camera_vertices[iu].delta,
            )
        } else {
            (
                camera_vertices[iu].pdf_rev,
                camera_vertices[iu].pdf_fwd,
                camera_vertices[iu].delta,
            )
        };
        let delta_prev = camera_vertices[iu - 1].delta;
        ri *= remap0(pdf_rev) / remap0(pdf_fwd);
        if !delta_i && !delta_prev {
            sum_ri += ri;
        }
        i -= 1;
    }

    // Strategies along the light subpath
    ri = 1.0;
    let mut i = s as isize - 1;
    while i >= 0 {
        let iu = i as usize;
        let (pdf_rev, pdf_fwd, delta_i) = if iu == s - 1 {
            (
                qs_pdf_rev.unwrap_or(0.0),
                qs.as_ref().map(|v| v.pdf_fwd).unwrap_or(0.0),
                false,
            )
        } else if s >= 2 && iu == s - 2 {
            (
                qs_minus_pdf_rev.unwrap_or(0.0),
                light_vertices[iu].pdf_fwd,
                light_vertices[iu].delta,
            )
        } else {
            (
                light_vertices[iu].pdf_rev,
                light_vertices[iu].pdf_fwd,
                light_vertices[iu].delta,
            )
        };
        let delta_prev = if iu > 0 {
            light_vertices[iu - 1].delta
        } else {
            // The strategy that starts the light path at this vertex
            let v = if iu == s - 1 {
                qs.as_ref().unwrap()
            } else {
                &light_vertices[iu]
            };
            v.is_delta_light()
        };
        ri *= remap0(pdf_rev) / remap0(pdf_fwd);
        if !delta_i && !delta_prev {
            sum_ri += ri;
        }
        i -= 1;
    }

    1.0 / (1.0 + sum_ri)
}

/// Join the prefixes of the two subpaths for strategy (s, t) and return the
/// weighted contribution, plus the raster position for t = 1 splats.
pub fn connect_bdpt<'s, 'a>(
    scene: &'s Scene,
    light_vertices: &[Vertex<'s, 'a>],
    camera_vertices: &[Vertex<'s, 'a>],
    s: usize,
    t: usize,
    light_distr: &Distribution1D,
    camera: &'s dyn Camera,
    sampler: &mut dyn Sampler,
) -> (Spectrum, Option<Point2f>) {
    // Connections behind an escaped camera path are meaningless
    if t > 1 && s != 0 && camera_vertices[t - 1].vtype == VertexType::Light {
        return (Spectrum::black(), None);
    }

    let mut l = Spectrum::black();
    let mut sampled: Option<Vertex<'s, 'a>> = None;
    let mut p_raster = None;

    if s == 0 {
        // The camera subpath found a light on its own
        let pt = &camera_vertices[t - 1];
        if pt.is_light() {
            l = pt.le(scene, &camera_vertices[t - 2]) * pt.beta;
        }
    } else if t == 1 {
        // Connect the light subpath straight to the lens
        let qs = &light_vertices[s - 1];
        if qs.is_connectible() {
            let (importance, wi, pdf, praster, mut vis) =
                camera.sample_wi(&qs.base, sampler.get_2d());
            if pdf > 0.0 && !importance.is_black() {
                let new_vertex =
                    Vertex::camera_vertex_at(camera, vis.p1, importance / pdf);
                l = qs.beta * qs.f(&new_vertex, TransportMode::Importance) * new_vertex.beta;
                if qs.is_on_surface() {
                    l *= wi.dotn(&qs.ns()).abs();
                }
                if !l.is_black() {
                    vis.medium = match qs.vtype {
                        VertexType::Medium => qs.mi.as_ref().and_then(|m| m.medium.clone()),
                        VertexType::Surface => {
                            qs.si.as_ref().and_then(|si| si.medium_for(&wi))
                        }
                        _ => None,
                    };
                    l *= vis.tr(scene, sampler);
                }
                p_raster = praster;
                sampled = Some(new_vertex);
            }
        }
    } else if s == 1 {
        // Sample a point on a light and connect it to the camera subpath
        let pt = &camera_vertices[t - 1];
        if pt.is_connectible() {
            let (light_num, light_pdf) = light_distr.sample_discrete(sampler.get_1d());
            if light_pdf > 0.0 {
                let light = &scene.lights[light_num];
                let (light_weight, wi, pdf, mut vis) =
                    light.sample_li(&pt.base, sampler.get_2d());
                if pdf > 0.0 && !light_weight.is_black() {
                    let mut new_vertex = Vertex::light_vertex_at(
                        Some(&**light),
                        vis.p1,
                        light_weight / (pdf * light_pdf),
                        0.0,
                    );
                    new_vertex.pdf_fwd = new_vertex.pdf_light_origin(scene, pt, light_distr);
                    l = pt.beta * pt.f(&new_vertex, TransportMode::Radiance) * new_vertex.beta;
                    if pt.is_on_surface() {
                        l *= wi.dotn(&pt.ns()).abs();
                    }
                    if !l.is_black() {
                        vis.medium = match pt.vtype {
                            VertexType::Medium => {
                                pt.mi.as_ref().and_then(|m| m.medium.clone())
                            }
                            VertexType::Surface => {
                                pt.si.as_ref().and_then(|si| si.medium_for(&wi))
                            }
                            _ => None,
                        };
                        l *= vis.tr(scene, sampler);
                    }
                    sampled = Some(new_vertex);
                }
            }
        }
    } else {
        // General case: join interior vertices
        let qs = &light_vertices[s - 1];
        let pt = &camera_vertices[t - 1];
        if qs.is_connectible() && pt.is_connectible() {
            l = qs.beta
                * qs.f(pt, TransportMode::Importance)
                * pt.f(qs, TransportMode::Radiance)
                * pt.beta;
            if !l.is_black() {
                l *= g(scene, sampler, qs, pt);
            }
        }
    }

    if l.is_black() {
        return (Spectrum::black(), p_raster);
    }

    let weight = mis_weight(
        scene,
        light_vertices,
        camera_vertices,
        sampled.as_ref(),
        s,
        t,
        light_distr,
    );
    debug_assert!(!weight.is_nan());
    (l * weight, p_raster)
}

/// Bidirectional path tracer over all (s, t) connection strategies.
pub struct BdptIntegrator {
    camera: Arc<dyn Camera>,
    sampler: Box<dyn Sampler>,
    max_depth: u32,
}

impl BdptIntegrator {
    pub fn new(
        camera: Arc<dyn Camera>,
        sampler: Box<dyn Sampler>,
        max_depth: u32,
    ) -> BdptIntegrator {
        BdptIntegrator {
            camera,
            sampler,
            max_depth,
        }
    }

    pub fn render(&mut self, scene: &Scene, opts: &RenderOptions) -> Result<()> {
        let film = Arc::clone(self.camera.film());
        let sample_bounds = film.get_sample_bounds();
        let extent = sample_bounds.diagonal();
        let block_size = opts.block_size.max(1);
        let n_tiles = Point2i::new(
            (extent.x + block_size - 1) / block_size,
            (extent.y + block_size - 1) / block_size,
        );
        let spp = self.sampler.samples_per_pixel();
        let light_distr = scene.light_distribution();
        info!(
            "BDPT: {}x{} tiles, {} spp, max depth {}",
            n_tiles.x, n_tiles.y, spp, self.max_depth
        );

        let pb = indicatif::ProgressBar::new((n_tiles.x * n_tiles.y) as u64 * spp as u64);

        for pass in 0..spp {
            if opts.stop.load(Ordering::Relaxed) {
                break;
            }
            let tile_indices = Mutex::new(0..(n_tiles.x * n_tiles.y));
            let finished: Mutex<Vec<(i32, crate::film::FilmTile)>> = Mutex::new(Vec::new());
            let camera: &dyn Camera = &*self.camera;
            let sampler_proto = &self.sampler;
            let max_depth = self.max_depth;
            let film_ref = &film;

            crossbeam::scope(|scope| {
                for _ in 0..opts.num_threads.max(1) {
                    let mut sampler = sampler_proto.box_clone();
                    let tile_indices = &tile_indices;
                    let finished = &finished;
                    let pb = &pb;
                    scope.spawn(move |_| {
                        let mut arena = Bump::new();
                        loop {
                            let tile_idx = {
                                let mut it = tile_indices.lock();
                                match it.next() {
                                    Some(t) => t,
                                    None => break,
                                }
                            };
                            let tile =
                                Point2i::new(tile_idx % n_tiles.x, tile_idx / n_tiles.x);
                            let seed = pass as u64 * (n_tiles.x * n_tiles.y) as u64
                                + tile_idx as u64;
                            sampler.reseed(seed);

                            let x0 = sample_bounds.p_min.x + tile.x * block_size;
                            let x1 = i32::min(x0 + block_size, sample_bounds.p_max.x);
                            let y0 = sample_bounds.p_min.y + tile.y * block_size;
                            let y1 = i32::min(y0 + block_size, sample_bounds.p_max.y);
                            let tile_bounds = Bounds2i::from_points(
                                &Point2i::new(x0, y0),
                                &Point2i::new(x1, y1),
                            );
                            let mut film_tile = film_ref.get_film_tile(&tile_bounds);

                            for p in &tile_bounds {
                                sampler.start_pixel(p);
                                if !sampler.set_sample_number(pass) {
                                    continue;
                                }
                                let jitter = sampler.get_2d();
                                let p_film = Point2f::new(
                                    p.x as f32 + jitter.x,
                                    p.y as f32 + jitter.y,
                                );

                                let mut camera_vertices =
                                    Vec::with_capacity(max_depth as usize + 2);
                                let mut light_vertices =
                                    Vec::with_capacity(max_depth as usize + 1);
                                let n_camera = generate_camera_subpath(
                                    scene,
                                    sampler.as_mut(),
                                    &arena,
                                    max_depth + 2,
                                    camera,
                                    p_film,
                                    &mut camera_vertices,
                                );
                                let n_light = generate_light_subpath(
                                    scene,
                                    sampler.as_mut(),
                                    &arena,
                                    max_depth + 1,
                                    light_distr,
                                    &mut light_vertices,
                                );

                                let mut l = Spectrum::black();
                                for t in 1..=n_camera {
                                    for s in 0..=n_light {
                                        let depth = (s + t) as i32 - 2;
                                        if (s == 1 && t == 1)
                                            || depth < 0
                                            || depth > max_depth as i32
                                        {
                                            continue;
                                        }
                                        let (lpath, praster) = connect_bdpt(
                                            scene,
                                            &light_vertices,
                                            &camera_vertices,
                                            s,
                                            t,
                                            light_distr,
                                            camera,
                                            sampler.as_mut(),
                                        );
                                        if t == 1 {
                                            if let Some(pr) = praster {
                                                if !lpath.is_black() {
                                                    film_ref.add_splat(pr, lpath);
                                                }
                                            }
                                        } else {
                                            l += lpath;
                                        }
                                    }
                                }
                                if l.has_nan() || l.y().is_infinite() || l.y() < -1e-5 {
                                    log::error!(
                                        "dropping invalid BDPT sample at {}",
                                        p
                                    );
                                    l = Spectrum::black();
                                }
                                drop(camera_vertices);
                                drop(light_vertices);
                                film_tile.add_sample(p_film, l);
                                arena.reset();
                            }
                            finished.lock().push((tile_idx, film_tile));
                            pb.inc(1);
                        }
                    });
                }
            })
            .expect("worker thread panicked");

            let mut tiles = finished.into_inner();
            tiles.sort_by_key(|(idx, _)| *idx);
            for (_, tile) in &tiles {
                film.merge_film_tile(tile);
            }

            if let Some(ref pattern) = opts.output {
                film.write_image(
                    checkpoint_path(pattern, pass + 1),
                    1.0 / (pass + 1) as f32,
                )?;
            }
        }
        pb.finish();

        Ok(())
    }

    /// Scale applied to the splat buffer at final write time.
    pub fn splat_scale(&self) -> f32 {
        1.0 / self.sampler.samples_per_pixel() as f32
    }
}
