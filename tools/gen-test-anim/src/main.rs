//! gen-test-anim - procedural compressed animation clips
//!
//! Generates a small set of `.ncanim` clips for playback testing and prints
//! the layout of existing ones.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use glam::{Quat, Vec3};
use nether_anim::{
    AnimationClip, BoneDesc, CLIP_EXT, Channel, ClipReader, CompressionSettings, Skeleton,
    SourceAnimation, SourceTrack, TrackDescriptor, compress_clips,
};
use std::f32::consts::TAU;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "gen-test-anim")]
#[command(about = "Generate and inspect compressed animation clips")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate wave, bind pose and additive clips
    Generate {
        /// Output directory
        #[arg(short, long, default_value = "assets")]
        output: PathBuf,

        /// Bones in the chain
        #[arg(short, long, default_value_t = 3)]
        bones: u16,

        /// Frames per clip
        #[arg(short, long, default_value_t = 30)]
        frames: u32,

        /// Sample rate in Hz
        #[arg(short, long, default_value_t = 30.0)]
        rate: f32,

        /// Compression settings file (TOML)
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Error threshold override
        #[arg(short, long)]
        tolerance: Option<f32>,
    },

    /// Print the header and track layout of a compressed clip
    Inspect {
        /// Input .ncanim file
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            output,
            bones,
            frames,
            rate,
            settings,
            tolerance,
        } => {
            let mut settings = match settings {
                Some(path) => CompressionSettings::load(&path)
                    .with_context(|| format!("Failed to load settings: {:?}", path))?,
                None => CompressionSettings::default(),
            };
            if let Some(tolerance) = tolerance {
                settings = settings.with_error_threshold(tolerance);
            }

            let written = generate(&output, bones, frames, rate, &settings)?;
            tracing::info!("Generated {} clips in {:?}", written.len(), output);
        }
        Commands::Inspect { input } => {
            let bytes =
                std::fs::read(&input).with_context(|| format!("Failed to read {:?}", input))?;
            print!("{}", inspect(&bytes)?);
        }
    }

    Ok(())
}

/// Chain skeleton along +Y; the tip is a key bone
fn chain_skeleton(bones: u16, settings: &CompressionSettings) -> Result<Arc<Skeleton>> {
    if bones == 0 {
        bail!("skeleton needs at least one bone");
    }
    let descs: Vec<BoneDesc> = (0..bones)
        .map(|i| {
            let offset = if i == 0 { 0.0 } else { 1.5 };
            BoneDesc::new(format!("bone{}", i), i.checked_sub(1))
                .with_bind(Quat::IDENTITY, Vec3::new(0.0, offset, 0.0))
                .key_bone(i == bones - 1)
        })
        .collect();
    Ok(Arc::new(Skeleton::from_descs(&descs, &settings.vertex_distances)?))
}

/// Host-style wave: every bone sways about Z with a phase offset
fn wave_source(bones: u16, frames: u32, rate: f32, additive: bool) -> SourceAnimation {
    let name = if additive { "wave-additive" } else { "wave" };
    let mut source = SourceAnimation::new(name, frames, rate);

    for bone in 0..bones {
        let phase = bone as f32 * 0.5;
        let rotations = (0..frames)
            .map(|frame| {
                let t = frame as f32 / frames as f32 * TAU;
                Quat::from_rotation_z((t + phase).sin() * 0.3)
            })
            .collect();
        let translation = if additive || bone == 0 {
            Vec3::ZERO
        } else {
            Vec3::new(0.0, 1.5, 0.0)
        };
        source.tracks.push(SourceTrack {
            bone_index: bone,
            rotations,
            translations: vec![translation],
            scales: Vec::new(),
        });
    }
    source
}

/// Build, compress and write the generated clips, returning the written paths
fn generate(
    output: &Path,
    bones: u16,
    frames: u32,
    rate: f32,
    settings: &CompressionSettings,
) -> Result<Vec<PathBuf>> {
    let skeleton = chain_skeleton(bones, settings)?;
    let clips = vec![
        AnimationClip::from_source(skeleton.clone(), &wave_source(bones, frames, rate, false), false)?,
        AnimationClip::bind_pose(skeleton.clone(), false)?,
        AnimationClip::from_source(skeleton, &wave_source(bones, frames, rate, true), true)?,
    ];
    let stems = ["anim-demo-wave", "anim-demo-bind", "anim-demo-wave-additive"];

    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {:?}", output))?;

    let mut written = Vec::with_capacity(clips.len());
    for ((clip, stem), result) in clips.iter().zip(stems).zip(compress_clips(&clips, settings)) {
        let compressed =
            result.with_context(|| format!("Failed to compress clip '{}'", clip.name()))?;
        let path = output.join(format!("{}.{}", stem, CLIP_EXT));
        std::fs::write(&path, &compressed.bytes)
            .with_context(|| format!("Failed to write {:?}", path))?;

        tracing::info!(
            "Wrote {:?} ({} bytes, {:.2}x, max error {:.6})",
            path,
            compressed.stats.compressed_size,
            compressed.stats.ratio,
            compressed.stats.max_error
        );
        written.push(path);
    }
    Ok(written)
}

/// Human-readable layout of a compressed clip
fn inspect(bytes: &[u8]) -> Result<String> {
    let reader = ClipReader::new(bytes).context("Not a valid compressed clip")?;
    let header = reader.header();

    let mut out = String::new();
    out.push_str(&format!("name:        {}\n", reader.name()));
    out.push_str(&format!(
        "samples:     {} @ {} Hz ({:.3}s)\n",
        reader.sample_count(),
        reader.sample_rate(),
        reader.duration()
    ));
    out.push_str(&format!("bones:       {}\n", reader.bone_count()));
    out.push_str(&format!("additive:    {}\n", reader.is_additive()));
    out.push_str(&format!(
        "formats:     {:?} / {:?} / {:?}\n",
        header.rotation_format, header.translation_format, header.scale_format
    ));
    out.push_str(&format!("payload:     {} bytes\n", header.payload_bytes));

    for (index, bone) in reader.bones().iter().enumerate() {
        let slot = match bone.output_index {
            Some(slot) => slot.to_string(),
            None => "-".to_string(),
        };
        out.push_str(&format!("bone {:>3} (output {}):", index, slot));
        for channel in Channel::ALL {
            let track = match bone.tracks[channel.index()] {
                TrackDescriptor::Default => "default".to_string(),
                TrackDescriptor::Constant(_) => "constant".to_string(),
                TrackDescriptor::Raw { components, .. } => format!("raw x{}", components),
                TrackDescriptor::Quantized { bits, .. } => format!("{} bits", bits),
            };
            out.push_str(&format!(" {}={}", channel.name(), track));
        }
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_writes_decodable_clips() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CompressionSettings::default();
        let written = generate(dir.path(), 4, 24, 30.0, &settings).unwrap();
        assert_eq!(written.len(), 3);

        for path in &written {
            assert_eq!(path.extension().unwrap(), CLIP_EXT);
            let bytes = std::fs::read(path).unwrap();
            let reader = ClipReader::new(&bytes).unwrap();
            assert_eq!(reader.bone_count(), 4);
            assert!(reader.decode_sample(0).is_ok());
        }

        let bytes = std::fs::read(&written[2]).unwrap();
        assert!(ClipReader::new(&bytes).unwrap().is_additive());
    }

    #[test]
    fn tip_uses_safe_vertex_distance() {
        let settings = CompressionSettings::default();
        let skeleton = chain_skeleton(3, &settings).unwrap();
        assert_eq!(skeleton.bone(2).unwrap().vertex_distance, settings.vertex_distances.safe);
        assert_eq!(skeleton.bone(0).unwrap().vertex_distance, settings.vertex_distances.default);
        assert!(chain_skeleton(0, &settings).is_err());
    }

    #[test]
    fn inspect_lists_every_bone() {
        let dir = tempfile::tempdir().unwrap();
        let written = generate(dir.path(), 3, 10, 30.0, &CompressionSettings::default()).unwrap();
        let bytes = std::fs::read(&written[0]).unwrap();

        let report = inspect(&bytes).unwrap();
        assert!(report.contains("name:        wave"));
        assert!(report.contains("bone   2 (output 2):"));
        assert!(report.contains("rotation="));
        assert!(inspect(&bytes[..8]).is_err());
    }
}
