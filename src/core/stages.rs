//! Stage operations shared by the orchestrator and the single-stage commands.

use std::ops::RangeInclusive;

use tracing::{info, warn};

use crate::adapters::{ScriptGenerator, VideoSynthesizer};
use crate::domain::{Script, Topic, VideoArtifact};
use crate::error::StageError;

use super::output::{ensure_parent, OutputPaths};

/// Generate narration for `topic` and persist it to the script path.
///
/// The persisted text always contains the topic verbatim. Length outside
/// `word_range` is logged, not rejected.
pub async fn write_script(
    generator: &dyn ScriptGenerator,
    topic: &Topic,
    paths: &OutputPaths,
    word_range: RangeInclusive<usize>,
) -> Result<Script, StageError> {
    let body = generator.generate(topic).await?;
    let script = Script::compose(topic, &body);

    let words = script.word_count();
    if !word_range.contains(&words) {
        warn!(
            words,
            min = *word_range.start(),
            max = *word_range.end(),
            "Script length outside target range"
        );
    }

    paths.write_script(&script).await?;
    info!(
        words,
        seconds = script.estimated_seconds().round() as u64,
        path = %paths.script.display(),
        "Script written"
    );

    Ok(script)
}

/// Render `script` into the configured video path
pub async fn render_video(
    synthesizer: &dyn VideoSynthesizer,
    script: &Script,
    paths: &OutputPaths,
) -> Result<VideoArtifact, StageError> {
    ensure_parent(&paths.video).await?;
    let video = synthesizer.render(script, &paths.video).await?;
    info!(
        provider = %video.provider,
        bytes = video.bytes,
        path = %video.path.display(),
        "Video rendered"
    );
    Ok(video)
}
