//! Modifier type descriptors and the grease pencil wave distortion.
//!
//! Each modifier type is described by a static [`ModifierTypeInfo`]:
//! display name, kind, capability flags and a set of optional callbacks.
//! Unset callbacks mean "nothing to do" for that stage.

use serde::{Deserialize, Serialize};

use crate::flags::flag_set;
use crate::gpencil::{GpencilData, Stroke};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifierType {
    GpencilWave,
}

impl ModifierType {
    pub fn all() -> &'static [ModifierType] {
        &[ModifierType::GpencilWave]
    }

    #[inline]
    pub fn info(self) -> &'static ModifierTypeInfo {
        modifier_type_info(self)
    }
}

/// Which object data a modifier type operates on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModifierKind {
    Gpencil,
}

flag_set! {
    pub struct ModifierTypeFlags {
        const GPENCIL_MOD = 1 << 0;
        const SUPPORTS_EDITMODE = 1 << 1;
        const GPENCIL_VFX = 1 << 2;
        /// At most one instance per object.
        const SINGLE = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveOrientation {
    /// Wave travels along X, displaces Z.
    #[default]
    Horizontal = 0,
    /// Wave travels along Z, displaces X.
    Vertical = 1,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveSettings {
    pub amplitude: f32,
    pub period: f32,
    pub phase: f32,
    pub orientation: WaveOrientation,
}

/// Per-instance settings; zeroed until the type's `init_data` runs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ModifierSettings {
    Wave(WaveSettings),
}

impl ModifierSettings {
    fn zeroed(ty: ModifierType) -> Self {
        match ty {
            ModifierType::GpencilWave => ModifierSettings::Wave(WaveSettings::default()),
        }
    }
}

pub type InitDataFn = fn(&mut ModifierSettings);
pub type CopyDataFn = fn(&ModifierSettings, &mut ModifierSettings);
pub type DeformStrokeFn = fn(&ModifierSettings, &mut Stroke);
pub type SettingsQueryFn = fn(&ModifierSettings) -> bool;

pub struct ModifierTypeInfo {
    pub name: &'static str,
    pub struct_name: &'static str,
    pub kind: ModifierKind,
    pub flags: ModifierTypeFlags,

    pub copy_data: Option<CopyDataFn>,
    pub deform_stroke: Option<DeformStrokeFn>,
    pub init_data: Option<InitDataFn>,
    pub is_disabled: Option<SettingsQueryFn>,
    pub depends_on_time: Option<SettingsQueryFn>,
}

static GPENCIL_WAVE: ModifierTypeInfo = ModifierTypeInfo {
    name: "Wave Distorsion",
    struct_name: "GpencilWaveModifierData",
    kind: ModifierKind::Gpencil,
    flags: ModifierTypeFlags::from_bits_truncate(
        ModifierTypeFlags::GPENCIL_MOD.bits()
            | ModifierTypeFlags::SUPPORTS_EDITMODE.bits()
            | ModifierTypeFlags::GPENCIL_VFX.bits()
            | ModifierTypeFlags::SINGLE.bits(),
    ),

    copy_data: None,
    deform_stroke: Some(wave_deform_stroke),
    init_data: Some(wave_init_data),
    is_disabled: Some(wave_is_disabled),
    depends_on_time: None,
};

pub fn modifier_type_info(ty: ModifierType) -> &'static ModifierTypeInfo {
    match ty {
        ModifierType::GpencilWave => &GPENCIL_WAVE,
    }
}

fn wave_init_data(settings: &mut ModifierSettings) {
    let ModifierSettings::Wave(wave) = settings;
    wave.amplitude = 6.0;
    wave.period = 0.2;
    wave.phase = 11.0;
    wave.orientation = WaveOrientation::Vertical;
}

fn wave_is_disabled(settings: &ModifierSettings) -> bool {
    let ModifierSettings::Wave(wave) = settings;
    wave.amplitude == 0.0 || !wave.amplitude.is_finite() || !wave.period.is_finite()
}

fn wave_deform_stroke(settings: &ModifierSettings, stroke: &mut Stroke) {
    let ModifierSettings::Wave(wave) = settings;
    for pt in &mut stroke.points {
        match wave.orientation {
            WaveOrientation::Horizontal => {
                pt.co.z += wave.amplitude * (pt.co.x * wave.period + wave.phase).sin();
            }
            WaveOrientation::Vertical => {
                pt.co.x += wave.amplitude * (pt.co.z * wave.period + wave.phase).sin();
            }
        }
    }
}

/// A modifier instance on an object's stack.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    pub name: String,
    pub modifier_type: ModifierType,
    pub settings: ModifierSettings,
    pub show_viewport: bool,
}

impl Modifier {
    /// New instance with the type's defaults applied.
    pub fn new(ty: ModifierType) -> Self {
        let info = ty.info();
        let mut settings = ModifierSettings::zeroed(ty);
        if let Some(init) = info.init_data {
            init(&mut settings);
        }
        Self {
            name: info.name.to_string(),
            modifier_type: ty,
            settings,
            show_viewport: true,
        }
    }

    #[inline]
    pub fn info(&self) -> &'static ModifierTypeInfo {
        self.modifier_type.info()
    }

    pub fn is_active(&self) -> bool {
        self.show_viewport && !self.info().is_disabled.is_some_and(|f| f(&self.settings))
    }

    pub fn depends_on_time(&self) -> bool {
        self.info().depends_on_time.is_some_and(|f| f(&self.settings))
    }

    /// Duplicate an instance, routing through `copy_data` when the type has one.
    pub fn duplicate(&self) -> Self {
        let mut copy = self.clone();
        if let Some(copy_data) = self.info().copy_data {
            copy_data(&self.settings, &mut copy.settings);
        }
        copy
    }
}

/// Run every active stroke-deforming modifier, in stack order, over a copy
/// of `data`.
pub fn apply_stack(modifiers: &[Modifier], data: &GpencilData) -> GpencilData {
    let mut evaluated = data.clone();
    for md in modifiers.iter().filter(|m| m.is_active()) {
        let Some(deform) = md.info().deform_stroke else {
            continue;
        };
        log::trace!("Applying modifier '{}'", md.name);
        for stroke in evaluated.strokes_mut() {
            deform(&md.settings, stroke);
        }
    }
    evaluated
}
