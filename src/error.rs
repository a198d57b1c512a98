use thiserror::Error;

/// Errors surfaced by the queue, the playback engine and their collaborators.
///
/// Every variant is recovered where it originates and turned into a reply for
/// the requester through [`PlaybackError::user_message`]; none of them is
/// meant to bring the process down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// The search or metadata lookup failed.
    #[error("resolution failed: {0}")]
    Resolution(String),

    /// The lookup succeeded but returned nothing playable.
    #[error("no results for query")]
    NoResults,

    /// Connecting, binding or driving the voice connection failed.
    #[error("voice link error: {0}")]
    VoiceLink(String),

    #[error("no active track to skip")]
    NoActiveTrack,

    #[error("nothing is playing")]
    NotPlaying,

    #[error("nothing is paused")]
    NotPaused,

    #[error("queue is full ({max} tracks)")]
    QueueFull { max: usize },

    #[error("requester is not in a voice channel")]
    NotInVoiceChannel,

    #[error("missing CONNECT or SPEAK permission")]
    MissingPermissions,
}

impl PlaybackError {
    /// Text shown to the user who triggered the error.
    pub fn user_message(&self) -> String {
        match self {
            PlaybackError::Resolution(_) => {
                "An error occurred while searching for the video.".to_string()
            }
            PlaybackError::NoResults => "No videos found for the search query.".to_string(),
            PlaybackError::VoiceLink(_) => {
                "Could not play audio in your voice channel, please try again.".to_string()
            }
            PlaybackError::NoActiveTrack => "There are no videos in the queue to skip.".to_string(),
            PlaybackError::NotPlaying => "There is no song currently playing.".to_string(),
            PlaybackError::NotPaused => "There is no paused song to resume.".to_string(),
            PlaybackError::QueueFull { max } => {
                format!("The queue is full (maximum {} songs).", max)
            }
            PlaybackError::NotInVoiceChannel => {
                "You must be in a voice channel to use this command.".to_string()
            }
            PlaybackError::MissingPermissions => {
                "I don't have permission to join or speak in your voice channel.".to_string()
            }
        }
    }

    /// Denials are expected outcomes of a request, not faults.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            PlaybackError::NoActiveTrack
                | PlaybackError::NotPlaying
                | PlaybackError::NotPaused
                | PlaybackError::QueueFull { .. }
                | PlaybackError::NotInVoiceChannel
                | PlaybackError::MissingPermissions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn state_denials_use_the_classic_wording() {
        assert_eq!(
            PlaybackError::NoActiveTrack.user_message(),
            "There are no videos in the queue to skip."
        );
        assert_eq!(
            PlaybackError::NotPlaying.user_message(),
            "There is no song currently playing."
        );
        assert_eq!(
            PlaybackError::NotPaused.user_message(),
            "There is no paused song to resume."
        );
    }

    #[test]
    fn voice_link_failures_are_not_denials() {
        assert!(!PlaybackError::VoiceLink("boom".into()).is_denial());
        assert!(!PlaybackError::Resolution("boom".into()).is_denial());
        assert!(PlaybackError::NotPaused.is_denial());
    }
}
