//! The `environment_probe` component

use lumen_core::{Color, LumenError, Result, Vec3};
use lumen_ecs::parse_vec3;
use lumen_render::{
    ClearMethod, EnvProbeState, ProbeType, RefreshMode, Resolution, TextureManager, TimeSlicing,
};

pub const COMPONENT_NAME: &str = "environment_probe";

const PROBE_TYPES: &[&str] = &["baked", "realtime"];
const REFRESH_MODES: &[&str] = &["on_awake", "every_frame", "via_scripting"];
const TIME_SLICINGS: &[&str] = &["all_faces_at_once", "individual_faces", "no_time_slicing"];
const CLEAR_METHODS: &[&str] = &["sky", "color"];
const RESOLUTIONS: &[&str] = &["16", "32", "64", "128", "256", "1024", "2048"];

/// Authoring-side probe settings as written in a scene file
#[derive(Clone, Debug, PartialEq)]
pub struct EnvironmentProbeConfig {
    pub probe_type: ProbeType,
    pub refresh_mode: RefreshMode,
    pub time_slicing: TimeSlicing,
    pub importance: i32,
    pub resolution: Resolution,
    pub hdr: bool,
    pub layer_mask: u32,
    pub clear_method: ClearMethod,
    pub clear_color: Color,
    pub clipping_near: f32,
    pub clipping_far: f32,
    pub box_projection: bool,
    /// Half extents of the influence box
    pub box_extent: Vec3,
    pub box_offset: Vec3,
    /// Texture names of pre-baked cubemaps
    pub baked_diffuse: Option<String>,
    pub baked_specular: Option<String>,
}

impl Default for EnvironmentProbeConfig {
    fn default() -> Self {
        let state = EnvProbeState::default();
        Self {
            probe_type: state.probe_type,
            refresh_mode: state.refresh_mode,
            time_slicing: state.time_slicing,
            importance: state.importance,
            resolution: state.resolution,
            hdr: state.use_hdr,
            layer_mask: state.layer_mask,
            clear_method: state.clear_method,
            clear_color: state.clear_color,
            clipping_near: state.clipping_near,
            clipping_far: state.clipping_far,
            box_projection: state.use_box_projection,
            box_extent: state.box_size,
            box_offset: state.box_offset,
            baked_diffuse: None,
            baked_specular: None,
        }
    }
}

impl EnvironmentProbeConfig {
    /// Parse from a component table; missing fields keep their defaults,
    /// unrecognised enum values are an error
    pub fn from_toml(table: &toml::value::Table) -> Result<Self> {
        let mut config = Self::default();

        if let Some(s) = str_field(table, "type") {
            config.probe_type = match s {
                "baked" => ProbeType::Baked,
                "realtime" => ProbeType::Realtime,
                other => return Err(LumenError::invalid_enum(other, PROBE_TYPES)),
            };
        }
        if let Some(s) = str_field(table, "refresh_mode") {
            config.refresh_mode = match s {
                "on_awake" => RefreshMode::OnAwake,
                "every_frame" => RefreshMode::EveryFrame,
                "via_scripting" => RefreshMode::ViaScripting,
                other => return Err(LumenError::invalid_enum(other, REFRESH_MODES)),
            };
        }
        if let Some(s) = str_field(table, "time_slicing") {
            config.time_slicing = match s {
                "all_faces_at_once" => TimeSlicing::AllFacesAtOnce,
                "individual_faces" => TimeSlicing::IndividualFaces,
                "no_time_slicing" => TimeSlicing::NoTimeSlicing,
                other => return Err(LumenError::invalid_enum(other, TIME_SLICINGS)),
            };
        }
        if let Some(s) = str_field(table, "clear_method") {
            config.clear_method = match s {
                "sky" => ClearMethod::SkyClear,
                "color" => ClearMethod::ColorClear,
                other => return Err(LumenError::invalid_enum(other, CLEAR_METHODS)),
            };
        }
        if let Some(v) = table.get("resolution") {
            let pixels = v.as_integer().unwrap_or(-1);
            config.resolution = u32::try_from(pixels)
                .ok()
                .and_then(Resolution::from_pixels)
                .ok_or_else(|| LumenError::invalid_enum(v.to_string(), RESOLUTIONS))?;
        }

        if let Some(v) = table.get("importance").and_then(|v| v.as_integer()) {
            config.importance = v as i32;
        }
        if let Some(v) = table.get("hdr").and_then(|v| v.as_bool()) {
            config.hdr = v;
        }
        if let Some(v) = table.get("layer_mask").and_then(|v| v.as_integer()) {
            config.layer_mask = v as u32;
        }
        if let Some(v) = table.get("clear_color") {
            config.clear_color = toml_color(v, config.clear_color);
        }
        if let Some(v) = table.get("clear_alpha") {
            config.clear_color.a = toml_f32(v, config.clear_color.a);
        }
        if let Some(v) = table.get("clipping_near") {
            config.clipping_near = toml_f32(v, config.clipping_near);
        }
        if let Some(v) = table.get("clipping_far") {
            config.clipping_far = toml_f32(v, config.clipping_far);
        }
        if let Some(v) = table.get("box_projection").and_then(|v| v.as_bool()) {
            config.box_projection = v;
        }
        if let Some(v) = table.get("box_extent").and_then(parse_vec3) {
            config.box_extent = v;
        }
        if let Some(v) = table.get("box_offset").and_then(parse_vec3) {
            config.box_offset = v;
        }
        config.baked_diffuse = str_field(table, "baked_diffuse").map(String::from);
        config.baked_specular = str_field(table, "baked_specular").map(String::from);

        Ok(config)
    }

    /// Render-side state at `origin`, with baked texture names resolved
    /// against `textures`. Names that do not resolve are left unset.
    pub fn to_state(&self, origin: Vec3, textures: &TextureManager) -> EnvProbeState {
        let resolve = |name: &Option<String>| {
            let name = name.as_deref()?;
            let handle = textures.find(name);
            if handle.is_none() {
                log::warn!("baked probe texture '{}' is not loaded", name);
            }
            handle
        };

        EnvProbeState {
            probe_type: self.probe_type,
            refresh_mode: self.refresh_mode,
            time_slicing: self.time_slicing,
            importance: self.importance,
            resolution: self.resolution,
            use_hdr: self.hdr,
            layer_mask: self.layer_mask,
            clear_method: self.clear_method,
            clear_color: self.clear_color,
            clipping_near: self.clipping_near,
            clipping_far: self.clipping_far,
            use_box_projection: self.box_projection,
            box_size: self.box_extent,
            box_offset: self.box_offset,
            origin,
            baked_diffuse_probe_texture: resolve(&self.baked_diffuse),
            baked_specular_probe_texture: resolve(&self.baked_specular),
        }
    }

    /// Whether this probe draws from the named texture
    pub fn references_texture(&self, name: &str) -> bool {
        self.baked_diffuse.as_deref() == Some(name) || self.baked_specular.as_deref() == Some(name)
    }
}

fn str_field<'a>(table: &'a toml::value::Table, key: &str) -> Option<&'a str> {
    table.get(key).and_then(|v| v.as_str())
}

fn toml_f32(v: &toml::Value, default: f32) -> f32 {
    v.as_float()
        .map(|f| f as f32)
        .or_else(|| v.as_integer().map(|i| i as f32))
        .unwrap_or(default)
}

/// `[r, g, b]`, `[r, g, b, a]` or a `0xRRGGBB` integer
fn toml_color(v: &toml::Value, default: Color) -> Color {
    if let Some(hex) = v.as_integer() {
        return Color::from_hex(hex as u32);
    }
    match v.as_array() {
        Some(arr) if arr.len() >= 3 => Color::new(
            toml_f32(&arr[0], default.r),
            toml_f32(&arr[1], default.g),
            toml_f32(&arr[2], default.b),
            arr.get(3).map(|a| toml_f32(a, default.a)).unwrap_or(default.a),
        ),
        _ => default,
    }
}
