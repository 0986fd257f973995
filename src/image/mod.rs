//! Image Builder (C4): packs a per-language source directory into a tar
//! build context and drives the engine to produce a named image.

use std::path::Path;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::info;
use walkdir::WalkDir;

use crate::engine::EngineClient;
use crate::error::{Error, Kind, Result};

const IMAGE_PREFIX: &str = "myriag";

/// The image tag for `lang` (`<prefix>_<lang>`).
pub fn image_name(lang: &str) -> String {
    format!("{IMAGE_PREFIX}_{lang}")
}

/// Packs every regular file under `languages_path/lang` into an uncompressed
/// tar archive, preserving relative paths and file-info-derived headers.
pub fn build_context(languages_path: &Path, lang: &str) -> Result<Vec<u8>> {
    let dir = languages_path.join(lang);
    let mut archive = tar::Builder::new(Vec::new());

    for entry in WalkDir::new(&dir).into_iter() {
        let entry = entry.map_err(|e| {
            Error::new(
                "image.build_context",
                Kind::Io,
                format!("walking {}: {e}", dir.display()),
            )
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(&dir)
            .expect("walkdir entries are always under the walked root");

        archive
            .append_path_with_name(entry.path(), relative)
            .map_err(|e| {
                Error::new(
                    "image.build_context",
                    Kind::Io,
                    format!("packing {}: {e}", entry.path().display()),
                )
            })?;
    }

    archive.into_inner().map_err(|e| {
        Error::new("image.build_context", Kind::Io, format!("finalizing tar: {e}"))
    })
}

/// Build images for every language in `langs`, in list order, aborting on
/// the first failure.
pub async fn build_sequential(
    engine: &dyn EngineClient,
    languages_path: &Path,
    langs: &[String],
) -> Result<()> {
    for lang in langs {
        build_one(engine, languages_path, lang).await?;
    }
    Ok(())
}

/// Build images for every language in `langs` concurrently, one task per
/// language. All tasks are awaited before returning regardless of failure;
/// the first error encountered (in task-completion order) is returned.
pub async fn build_concurrent(
    engine: Arc<dyn EngineClient>,
    languages_path: &Path,
    langs: &[String],
) -> Result<()> {
    let tasks = langs.iter().cloned().map(|lang| {
        let engine = engine.clone();
        let languages_path = languages_path.to_path_buf();
        tokio::spawn(async move { build_one(engine.as_ref(), &languages_path, &lang).await })
    });

    let results = join_all(tasks).await;

    let mut first_error = None;
    for joined in results {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            Err(join_err) => {
                if first_error.is_none() {
                    first_error = Some(Error::new(
                        "image.build_concurrent",
                        Kind::Internal,
                        format!("build task panicked: {join_err}"),
                    ));
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn build_one(engine: &dyn EngineClient, languages_path: &Path, lang: &str) -> Result<()> {
    let tag = image_name(lang);
    info!(lang, tag, "building image");
    let context = build_context(languages_path, lang)?;
    engine
        .build_image(context, &tag)
        .await
        .map_err(|e| Error::wrap("image.build_one", Kind::Other, e))?;
    info!(lang, tag, "image built");
    Ok(())
}
