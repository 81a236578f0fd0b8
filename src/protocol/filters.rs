//! Audio filter configuration with tri-state fields.
//!
//! Every field of [`Filters`] is tri-state:
//!
//! * *unset* (`None`) — omitted from serialization; merging never changes a
//!   previously set value
//! * *cleared* (`Some(None)`) — serialized as `null`, explicitly removing
//!   the effect on the node
//! * *set* (`Some(Some(v))`) — serialized with its value
//!
//! The distinction is what makes the sparse update-player merge safe: an
//! update that does not mention an effect leaves it untouched server-side.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tri-state wrapper used by every filter field.
pub type Field<T> = Option<Option<T>>;

/// A sparse set of named effect configurations.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    /// Volume multiplier applied before the other effects. Values above
    /// `1.0` amplify and may clip.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    pub volume: Field<f64>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    pub equalizer: Field<Vec<Equalizer>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    pub karaoke: Field<Karaoke>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    pub timescale: Field<Timescale>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    pub tremolo: Field<Tremolo>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    pub vibrato: Field<Vibrato>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    pub rotation: Field<Rotation>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    pub distortion: Field<Distortion>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    pub channel_mix: Field<ChannelMix>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    pub low_pass: Field<LowPass>,

    /// Opaque configuration for node-side plugin filters.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_with::rust::double_option"
    )]
    pub plugin_filters: Field<serde_json::Map<String, serde_json::Value>>,
}

impl Filters {
    /// An entirely unset filter configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn volume(mut self, volume: f64) -> Self {
        self.volume = Some(Some(volume));
        self
    }

    #[must_use]
    pub fn clear_volume(mut self) -> Self {
        self.volume = Some(None);
        self
    }

    #[must_use]
    pub fn equalizer(mut self, bands: Vec<Equalizer>) -> Self {
        self.equalizer = Some(Some(bands));
        self
    }

    #[must_use]
    pub fn clear_equalizer(mut self) -> Self {
        self.equalizer = Some(None);
        self
    }

    #[must_use]
    pub fn karaoke(mut self, karaoke: Karaoke) -> Self {
        self.karaoke = Some(Some(karaoke));
        self
    }

    #[must_use]
    pub fn clear_karaoke(mut self) -> Self {
        self.karaoke = Some(None);
        self
    }

    #[must_use]
    pub fn timescale(mut self, timescale: Timescale) -> Self {
        self.timescale = Some(Some(timescale));
        self
    }

    #[must_use]
    pub fn clear_timescale(mut self) -> Self {
        self.timescale = Some(None);
        self
    }

    #[must_use]
    pub fn tremolo(mut self, tremolo: Tremolo) -> Self {
        self.tremolo = Some(Some(tremolo));
        self
    }

    #[must_use]
    pub fn clear_tremolo(mut self) -> Self {
        self.tremolo = Some(None);
        self
    }

    #[must_use]
    pub fn vibrato(mut self, vibrato: Vibrato) -> Self {
        self.vibrato = Some(Some(vibrato));
        self
    }

    #[must_use]
    pub fn clear_vibrato(mut self) -> Self {
        self.vibrato = Some(None);
        self
    }

    #[must_use]
    pub fn rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = Some(Some(rotation));
        self
    }

    #[must_use]
    pub fn clear_rotation(mut self) -> Self {
        self.rotation = Some(None);
        self
    }

    #[must_use]
    pub fn distortion(mut self, distortion: Distortion) -> Self {
        self.distortion = Some(Some(distortion));
        self
    }

    #[must_use]
    pub fn clear_distortion(mut self) -> Self {
        self.distortion = Some(None);
        self
    }

    #[must_use]
    pub fn channel_mix(mut self, channel_mix: ChannelMix) -> Self {
        self.channel_mix = Some(Some(channel_mix));
        self
    }

    #[must_use]
    pub fn clear_channel_mix(mut self) -> Self {
        self.channel_mix = Some(None);
        self
    }

    #[must_use]
    pub fn low_pass(mut self, low_pass: LowPass) -> Self {
        self.low_pass = Some(Some(low_pass));
        self
    }

    #[must_use]
    pub fn clear_low_pass(mut self) -> Self {
        self.low_pass = Some(None);
        self
    }

    #[must_use]
    pub fn plugin_filters(
        mut self,
        filters: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        self.plugin_filters = Some(Some(filters));
        self
    }

    #[must_use]
    pub fn clear_plugin_filters(mut self) -> Self {
        self.plugin_filters = Some(None);
        self
    }

    /// Merges `update` into `self`.
    ///
    /// Only fields the update mentions (set or cleared) change; unset
    /// fields keep their previous value.
    pub fn merge(&mut self, update: &Self) {
        fn apply<T: Clone>(target: &mut Field<T>, source: &Field<T>) {
            if let Some(value) = source {
                *target = Some(value.clone());
            }
        }

        apply(&mut self.volume, &update.volume);
        apply(&mut self.equalizer, &update.equalizer);
        apply(&mut self.karaoke, &update.karaoke);
        apply(&mut self.timescale, &update.timescale);
        apply(&mut self.tremolo, &update.tremolo);
        apply(&mut self.vibrato, &update.vibrato);
        apply(&mut self.rotation, &update.rotation);
        apply(&mut self.distortion, &update.distortion);
        apply(&mut self.channel_mix, &update.channel_mix);
        apply(&mut self.low_pass, &update.low_pass);
        apply(&mut self.plugin_filters, &update.plugin_filters);
    }
}

/// A single equalizer band adjustment.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Equalizer {
    /// Band index, 0 (25 Hz) through 14 (16 kHz).
    pub band: u8,
    /// Gain multiplier offset, `-0.25` (muted) through `1.0`.
    pub gain: f64,
}

impl Equalizer {
    /// Builds a band adjustment, validating the node's accepted ranges.
    pub fn new(band: u8, gain: f64) -> Result<Self> {
        if band > 14 {
            return Err(Error::build(format!(
                "equalizer band must be 0-14, got {band}"
            )));
        }
        if !(-0.25..=1.0).contains(&gain) {
            return Err(Error::build(format!(
                "equalizer gain must be -0.25 to 1.0, got {gain}"
            )));
        }

        Ok(Self { band, gain })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Karaoke {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mono_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_band: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_width: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timescale {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tremolo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vibrato {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rotation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_hz: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distortion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sin_offset: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sin_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cos_offset: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cos_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tan_offset: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tan_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMix {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_to_left: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_to_right: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_to_left: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right_to_right: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LowPass {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoothing: Option<f64>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn unset_fields_are_omitted() {
        let filters = Filters::new().volume(0.8);
        let value = serde_json::to_value(&filters).unwrap();
        assert_eq!(value, json!({"volume": 0.8}));
    }

    #[test]
    fn cleared_fields_serialize_as_null() {
        let filters = Filters::new().clear_karaoke();
        let value = serde_json::to_value(&filters).unwrap();
        assert_eq!(value, json!({"karaoke": null}));
    }

    #[test]
    fn merge_never_lets_unset_overwrite() {
        let mut current = Filters::new()
            .volume(0.5)
            .timescale(Timescale {
                speed: Some(1.25),
                ..Timescale::default()
            });

        // The update mentions karaoke (cleared) and tremolo (set), nothing
        // else; volume and timescale must survive unchanged.
        let update = Filters::new().clear_karaoke().tremolo(Tremolo {
            frequency: Some(2.0),
            depth: Some(0.5),
        });
        current.merge(&update);

        assert_eq!(current.volume, Some(Some(0.5)));
        assert_eq!(
            current.timescale,
            Some(Some(Timescale {
                speed: Some(1.25),
                ..Timescale::default()
            }))
        );
        assert_eq!(current.karaoke, Some(None));
        assert!(matches!(current.tremolo, Some(Some(_))));
    }

    #[test]
    fn tri_state_round_trips() {
        let filters = Filters::new().volume(1.2).clear_low_pass();
        let body = serde_json::to_string(&filters).unwrap();
        let decoded: Filters = serde_json::from_str(&body).unwrap();
        assert_eq!(decoded, filters);
    }

    #[test]
    fn equalizer_validates_node_ranges() {
        assert!(Equalizer::new(3, 0.95).is_ok());
        assert!(Equalizer::new(15, 0.0).is_err());
        assert!(Equalizer::new(0, 1.5).is_err());
        assert!(Equalizer::new(14, -0.25).is_ok());
    }
}
