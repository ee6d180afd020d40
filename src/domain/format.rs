//! Output container profiles
//!
//! Maps a lower-cased output extension to the encoder parameters used when
//! transcoding into that container. Unknown extensions resolve to an empty
//! profile so the encoder picks its own defaults.

use std::path::Path;

use super::model::extension_of;

/// Encoder parameters for one output container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatProfile {
    pub extension: &'static str,
    pub video_codec: Option<&'static str>,
    pub audio_codec: Option<&'static str>,
    /// Extra `-key value` options passed to the encoder
    pub compatibility_flags: &'static [(&'static str, &'static str)],
}

const STRICT_EXPERIMENTAL: &[(&str, &str)] = &[("strict", "experimental")];

const PROFILES: &[FormatProfile] = &[
    FormatProfile {
        extension: "mp4",
        video_codec: Some("libx264"),
        audio_codec: Some("aac"),
        compatibility_flags: STRICT_EXPERIMENTAL,
    },
    FormatProfile {
        extension: "avi",
        video_codec: Some("libx264"),
        audio_codec: Some("mp3"),
        compatibility_flags: STRICT_EXPERIMENTAL,
    },
    FormatProfile {
        extension: "mkv",
        video_codec: Some("libx264"),
        audio_codec: Some("aac"),
        compatibility_flags: STRICT_EXPERIMENTAL,
    },
    FormatProfile {
        extension: "mov",
        video_codec: Some("libx264"),
        audio_codec: Some("aac"),
        compatibility_flags: STRICT_EXPERIMENTAL,
    },
    FormatProfile {
        extension: "wmv",
        video_codec: Some("msmpeg4"),
        audio_codec: Some("wmav2"),
        compatibility_flags: STRICT_EXPERIMENTAL,
    },
];

impl FormatProfile {
    /// Profile with no codec or flag settings
    pub const fn empty() -> Self {
        Self {
            extension: "",
            video_codec: None,
            audio_codec: None,
            compatibility_flags: &[],
        }
    }

    /// Look up a profile by extension, ignoring case and a leading dot
    pub fn lookup(extension: &str) -> Self {
        let wanted = extension.trim_start_matches('.').to_lowercase();
        PROFILES
            .iter()
            .find(|profile| profile.extension == wanted)
            .cloned()
            .unwrap_or_else(Self::empty)
    }

    /// Look up the profile for an output path
    pub fn for_path(path: &Path) -> Self {
        extension_of(path)
            .map(|ext| Self::lookup(&ext))
            .unwrap_or_else(Self::empty)
    }

    /// Extensions with a known profile
    pub fn known_extensions() -> impl Iterator<Item = &'static str> {
        PROFILES.iter().map(|profile| profile.extension)
    }

    pub fn is_empty(&self) -> bool {
        self.video_codec.is_none()
            && self.audio_codec.is_none()
            && self.compatibility_flags.is_empty()
    }

    /// Encoder arguments contributed by this profile
    pub fn encoder_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(codec) = self.video_codec {
            args.push("-vcodec".to_string());
            args.push(codec.to_string());
        }
        if let Some(codec) = self.audio_codec {
            args.push("-acodec".to_string());
            args.push(codec.to_string());
        }
        for (key, value) in self.compatibility_flags {
            args.push(format!("-{}", key));
            args.push(value.to_string());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_profiles() {
        let avi = FormatProfile::lookup("AVI");
        assert_eq!(avi.video_codec, Some("libx264"));
        assert_eq!(avi.audio_codec, Some("mp3"));

        let wmv = FormatProfile::lookup(".wmv");
        assert_eq!(wmv.video_codec, Some("msmpeg4"));
        assert_eq!(wmv.audio_codec, Some("wmav2"));
    }

    #[test]
    fn test_unknown_extension_is_empty() {
        let profile = FormatProfile::for_path(Path::new("/tmp/out.xyz"));
        assert!(profile.is_empty());
        assert!(profile.encoder_args().is_empty());
        assert!(FormatProfile::for_path(Path::new("/tmp/noext")).is_empty());
    }

    #[test]
    fn test_encoder_args_order() {
        let args = FormatProfile::lookup("mp4").encoder_args();
        assert_eq!(
            args,
            vec!["-vcodec", "libx264", "-acodec", "aac", "-strict", "experimental"]
        );
    }

    #[test]
    fn test_known_extensions() {
        let known: Vec<_> = FormatProfile::known_extensions().collect();
        assert_eq!(known, vec!["mp4", "avi", "mkv", "mov", "wmv"]);
    }
}
