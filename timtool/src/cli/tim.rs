/*
 * SPDX-FileCopyrightText: 2025 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{
    collections::HashSet,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    format::tim::{self, ExtractedImage, FlashImage, ImageId, Tim},
    util,
};

fn read_flash_image(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read flash image: {path:?}"))
}

fn display_info(cli: &TimCli, flash_image: &FlashImage) {
    if !cli.quiet {
        println!("{flash_image:#?}");
    }
}

/// Summary of a TIM header for the unpack info TOML.
#[derive(Debug, Serialize)]
struct HeaderInfo {
    offset: String,
    identifier: String,
    version: String,
    trusted: bool,
    num_images: u32,
}

impl From<&Tim<'_>> for HeaderInfo {
    fn from(tim: &Tim<'_>) -> Self {
        Self {
            offset: format!("{:#x}", tim.offset),
            identifier: tim.header.identifier().name(),
            version: tim::version_string(tim.header.version()),
            trusted: tim.header.is_trusted(),
            num_images: tim.header.num_images(),
        }
    }
}

/// Summary of a sub-image for the unpack info TOML.
#[derive(Debug, Serialize)]
struct ImageInfo {
    name: String,
    #[serde(with = "hex")]
    id: [u8; 4],
    #[serde(with = "hex")]
    next_id: [u8; 4],
    flash_entry: String,
    load_addr: String,
    size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
}

#[derive(Debug, Serialize)]
struct UnpackInfo {
    primary: HeaderInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    secondary: Option<HeaderInfo>,
    images: Vec<ImageInfo>,
}

fn write_info(path: &Path, info: &UnpackInfo) -> Result<()> {
    let data = toml_edit::ser::to_string_pretty(info)
        .with_context(|| format!("Failed to serialize image info TOML: {path:?}"))?;
    fs::write(path, data).with_context(|| format!("Failed to write image info TOML: {path:?}"))?;

    Ok(())
}

/// Pick an output file name for an image. Tags that are not safe to use in a
/// path are written in hex. Repeated tags get the image index appended.
fn output_file_name(id: ImageId, index: usize, used: &mut HashSet<String>) -> String {
    let name = id.name();
    let stem = if util::is_safe_file_name(&name) {
        name
    } else {
        format!("{:08x}", id.0)
    };

    let mut file_name = format!("{stem}.bin");
    if !used.insert(file_name.clone()) {
        file_name = format!("{stem}_{index}.bin");
        used.insert(file_name.clone());
    }

    file_name
}

/// Write one `<name> <flash entry> <size>` line per image. The numbers are in
/// hex without a prefix.
fn write_image_list(mut writer: impl Write, images: &[ExtractedImage<'_>]) -> io::Result<()> {
    for image in images {
        writeln!(
            writer,
            "{} {:x} {:x}",
            image.name,
            image.flash_entry,
            image.data.len(),
        )?;
    }

    Ok(())
}

fn list_subcommand(cli: &ListCli, writer: impl Write) -> Result<()> {
    let data = read_flash_image(&cli.input)?;
    let images = tim::get_flash_image_parts(&data)
        .with_context(|| format!("Failed to parse TIM headers: {:?}", cli.input))?;

    write_image_list(writer, &images).context("Failed to write image list")?;

    Ok(())
}

fn info_subcommand(tim_cli: &TimCli, cli: &InfoCli) -> Result<()> {
    let data = read_flash_image(&cli.input)?;
    let flash_image = FlashImage::parse(&data)
        .with_context(|| format!("Failed to parse TIM headers: {:?}", cli.input))?;

    display_info(tim_cli, &flash_image);

    Ok(())
}

fn unpack_subcommand(tim_cli: &TimCli, cli: &UnpackCli) -> Result<()> {
    let data = read_flash_image(&cli.input)?;
    let flash_image = FlashImage::parse(&data)
        .with_context(|| format!("Failed to parse TIM headers: {:?}", cli.input))?;

    display_info(tim_cli, &flash_image);

    for id in &cli.image {
        if flash_image.find_image(*id).is_none() {
            bail!("Image not found: {id:?}");
        }
    }

    fs::create_dir_all(&cli.output)
        .with_context(|| format!("Failed to create directory: {:?}", cli.output))?;

    let mut used = HashSet::new();
    let mut info = UnpackInfo {
        primary: HeaderInfo::from(&flash_image.primary),
        secondary: flash_image.secondary.as_ref().map(HeaderInfo::from),
        images: vec![],
    };

    for (index, image) in flash_image.images().enumerate() {
        let id = image.descriptor.id;
        let file = if cli.image.is_empty() || cli.image.contains(&id) {
            let file_name = output_file_name(id, index, &mut used);
            let path = cli.output.join(&file_name);

            fs::write(&path, image.data)
                .with_context(|| format!("Failed to write image {id:?}: {path:?}"))?;

            info!("Unpacked {id:?} to {path:?}");

            Some(file_name)
        } else {
            debug!("Skipping unselected image {id:?}");
            None
        };

        info.images.push(ImageInfo {
            name: image.name.clone(),
            id: id.to_bytes(),
            next_id: image.descriptor.next_id.to_bytes(),
            flash_entry: format!("{:#x}", image.flash_entry),
            load_addr: format!("{:#010x}", image.descriptor.load_addr),
            size: image.descriptor.size,
            file,
        });
    }

    let info_path = cli
        .output_info
        .clone()
        .unwrap_or_else(|| cli.output.join("images.toml"));
    write_info(&info_path, &info)?;

    Ok(())
}

pub fn tim_main(cli: &TimCli) -> Result<()> {
    match &cli.command {
        TimCommand::List(c) => list_subcommand(c, io::stdout().lock()),
        TimCommand::Info(c) => info_subcommand(cli, c),
        TimCommand::Unpack(c) => unpack_subcommand(cli, c),
    }
}

/// List the images in a flash image.
///
/// Each line contains the image name, its offset in the flash image, and its
/// size. The offset and size are in hex.
#[derive(Debug, Parser)]
struct ListCli {
    /// Path to input flash image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,
}

/// Display TIM header and image information.
#[derive(Debug, Parser)]
struct InfoCli {
    /// Path to input flash image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,
}

/// Unpack the images from a flash image.
///
/// Each image is written to `<name>.bin` in the output directory. A summary of
/// the TIM headers and all images is written as TOML.
#[derive(Debug, Parser)]
struct UnpackCli {
    /// Path to input flash image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Output directory for images.
    #[arg(short, long, value_name = "DIR", value_parser, default_value = ".")]
    output: PathBuf,

    /// Path to output info TOML. Defaults to `images.toml` in the output
    /// directory.
    #[arg(long, value_name = "FILE", value_parser)]
    output_info: Option<PathBuf>,

    /// Only unpack images with this name (or 0x-prefixed hex tag).
    #[arg(long, value_name = "NAME")]
    image: Vec<ImageId>,
}

#[derive(Debug, Subcommand)]
enum TimCommand {
    List(ListCli),
    Info(InfoCli),
    Unpack(UnpackCli),
}

/// Inspect TIM flash images.
#[derive(Debug, Parser)]
pub struct TimCli {
    #[command(subcommand)]
    command: TimCommand,

    /// Don't print TIM header information.
    #[arg(short, long, global = true)]
    quiet: bool,
}
