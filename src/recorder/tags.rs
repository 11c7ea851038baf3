use lofty::config::WriteOptions;
use lofty::error::LoftyError;
use lofty::prelude::*;
use lofty::tag::Tag;
use std::path::Path;
use std::time::Duration;

use crate::watcher::TrackTags;

/// Write the track's metadata into the recorded file.
///
/// The source URL goes into the comment field.
pub fn write_tags(path: &Path, tags: &TrackTags) -> Result<(), LoftyError> {
    let mut tagged = lofty::read_from_path(path)?;

    let tag_type = tagged.primary_tag_type();
    if tagged.primary_tag().is_none() {
        tagged.insert_tag(Tag::new(tag_type));
    }

    let Some(tag) = tagged.primary_tag_mut() else {
        return Ok(());
    };

    if !tags.title.is_empty() {
        tag.set_title(tags.title.clone());
    }
    if !tags.artist.is_empty() {
        tag.set_artist(tags.artist.clone());
    }
    if !tags.album.is_empty() {
        tag.set_album(tags.album.clone());
    }
    if let Some(track) = tags.track_number {
        tag.set_track(track);
    }
    if let Some(disc) = tags.disc_number {
        tag.set_disk(disc);
    }
    if let Some(url) = tags.source_url() {
        tag.set_comment(url.to_string());
    }

    tag.save_to_path(path, WriteOptions::default())
}

/// Length of the audio stream in `path`
pub fn read_duration(path: &Path) -> Result<Duration, LoftyError> {
    Ok(lofty::read_from_path(path)?.properties().duration())
}

/// Read back title/artist/album and the measured duration of a file
pub fn read_tags(path: &Path) -> Result<(TrackTags, Duration), LoftyError> {
    let tagged = lofty::read_from_path(path)?;
    let duration = tagged.properties().duration();

    let mut tags = TrackTags::default();
    if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
        tags.title = tag.title().map(|s| s.into_owned()).unwrap_or_default();
        tags.artist = tag.artist().map(|s| s.into_owned()).unwrap_or_default();
        tags.album = tag.album().map(|s| s.into_owned()).unwrap_or_default();
        tags.track_number = tag.track();
        tags.disc_number = tag.disk();
        tags.source_url = tag.comment().map(|s| s.into_owned());
    }

    Ok((tags, duration))
}
