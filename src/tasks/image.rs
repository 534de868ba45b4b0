//! The image task: one image call per view, saved through the store.

use futures::future::try_join_all;

use super::prompt::style_context;
use super::TaskContext;
use crate::character::{GeneratedImage, ImageSet, KnowledgeBase};
use crate::generation::{ImageData, ImageRequest};
use crate::{wlog_debug, Error, Result};

/// Views rendered for every character, in checkpoint order.
pub const IMAGE_VIEWS: [&str; 4] = ["portrait", "full_body", "expression", "action"];

/// Approximate token cost charged per rendered view.
pub(crate) const TOKENS_PER_IMAGE: u64 = 1290;

fn view_prompt(kb: &KnowledgeBase, view: &str) -> Result<String> {
    let character = kb.primary_character()?;
    let physical = kb.physical_description().ok_or_else(|| {
        Error::Precondition("image generation needs physical_description".to_string())
    })?;

    let framing = match view {
        "portrait" => "Head-and-shoulders portrait, neutral background.",
        "full_body" => "Full-body standing pose showing clothing and silhouette.",
        "expression" => "Close-up capturing a characteristic facial expression.",
        _ => "Dynamic action scene showing how they move.",
    };

    Ok(format!(
        "{} ({}). Appearance: {}. Body language: {}. Movement: {}. Mannerisms: {}. {}",
        character.name,
        character.role,
        character.appearance,
        physical.body_language,
        physical.movement_style,
        physical.mannerisms.join(", "),
        framing
    ))
}

/// Render every view and return the image set with its joined narrative.
pub(crate) async fn generate_images(
    kb: &KnowledgeBase,
    ctx: &TaskContext,
) -> Result<(ImageSet, String, u64)> {
    let style = style_context(kb);

    let renders = IMAGE_VIEWS.iter().map(|view| {
        let style = style.clone();
        async move {
            let request = ImageRequest {
                prompt: view_prompt(kb, view)?,
                style_context: style,
            };
            let artifact = ctx.image.generate_image(&request).await?;
            let path = match artifact.data {
                ImageData::Bytes { data, extension } => {
                    let file_name = format!("{}.{}", view, extension);
                    ctx.store
                        .save_image(ctx.character_id, &file_name, &data)
                        .await?
                }
                ImageData::Path(path) => path.display().to_string(),
                ImageData::Url(url) => url,
            };
            wlog_debug!("[tasks] {} image {} -> {}", ctx.character_id.short(), view, path);
            Ok::<_, Error>((
                GeneratedImage {
                    kind: view.to_string(),
                    path,
                    prompt: request.prompt,
                },
                format!("{}: {}", view, artifact.narrative),
            ))
        }
    });

    let (images, narratives): (Vec<_>, Vec<_>) = try_join_all(renders).await?.into_iter().unzip();
    let tokens = TOKENS_PER_IMAGE * images.len() as u64;
    Ok((
        ImageSet {
            images,
            style_profile: style,
        },
        narratives.join("\n\n"),
        tokens,
    ))
}
