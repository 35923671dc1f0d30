//! Stem registry
//!
//! Holds the ordered stems of the loaded song together with their volume and
//! "ever unmuted" bookkeeping. Stems are addressed by `StemKind`, never by
//! position, so registry entries and audio graph nodes cannot desync.

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use stemdle_common::models::Song;
use stemdle_common::StemKind;
use tracing::debug;

/// Highest volume percentage; 100 is unity gain
pub const MAX_VOLUME_PERCENT: u8 = 200;

/// One stem of the loaded song
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StemTrack {
    pub kind: StemKind,
    pub label: String,
    pub source_url: String,
    volume_percent: u8,
    ever_unmuted: bool,
}

impl StemTrack {
    /// New stem, muted and never unmuted
    pub fn new(kind: StemKind, source_url: impl Into<String>) -> Self {
        Self {
            kind,
            label: kind.label().to_string(),
            source_url: source_url.into(),
            volume_percent: 0,
            ever_unmuted: false,
        }
    }

    pub fn volume_percent(&self) -> u8 {
        self.volume_percent
    }

    /// Whether the volume was raised above 0 at any point since load
    pub fn ever_unmuted(&self) -> bool {
        self.ever_unmuted
    }

    pub fn is_muted(&self) -> bool {
        self.volume_percent == 0
    }
}

/// Stems of the active song
#[derive(Debug, Clone, Default)]
pub struct StemRegistry {
    tracks: Vec<StemTrack>,
}

impl StemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a song's stems in display order.
    ///
    /// Explicit per-stem URLs win; otherwise URLs are derived from
    /// `url_original`. A song with neither yields an empty list, which is a
    /// normal state rather than an error.
    pub fn load_stems(song: &Song) -> Vec<StemTrack> {
        let tracks: Vec<StemTrack> = StemKind::ALL
            .into_iter()
            .filter_map(|kind| song.stem_url(kind).map(|url| StemTrack::new(kind, url)))
            .collect();
        debug!("Resolved {} stems for song {}", tracks.len(), song.id);
        tracks
    }

    /// Replace the registry contents; every stem starts muted and clean
    pub fn replace(&mut self, tracks: Vec<StemTrack>) {
        self.tracks = tracks
            .into_iter()
            .map(|track| StemTrack::new(track.kind, track.source_url))
            .collect();
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    pub fn tracks(&self) -> &[StemTrack] {
        &self.tracks
    }

    pub fn kinds(&self) -> impl Iterator<Item = StemKind> + '_ {
        self.tracks.iter().map(|t| t.kind)
    }

    pub fn get(&self, kind: StemKind) -> Option<&StemTrack> {
        self.tracks.iter().find(|t| t.kind == kind)
    }

    pub fn contains(&self, kind: StemKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Set a stem's volume, clamped to 0..=200, and return the stored value.
    ///
    /// Any value above 0 marks the stem as ever unmuted; that mark survives
    /// later calls with 0 and is only cleared by loading another song.
    pub fn set_volume(&mut self, kind: StemKind, percent: i32) -> Result<u8> {
        let track = self
            .tracks
            .iter_mut()
            .find(|t| t.kind == kind)
            .ok_or(Error::StemNotFound(kind))?;

        let clamped = percent.clamp(0, MAX_VOLUME_PERCENT as i32) as u8;
        track.volume_percent = clamped;
        if clamped > 0 {
            track.ever_unmuted = true;
        }
        Ok(clamped)
    }

    /// Labels of all stems ever unmuted during this song
    pub fn ever_unmuted_labels(&self) -> BTreeSet<String> {
        self.tracks
            .iter()
            .filter(|t| t.ever_unmuted)
            .map(|t| t.label.clone())
            .collect()
    }
}
