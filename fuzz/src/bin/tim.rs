#[cfg(not(windows))]
mod fuzz {
    use honggfuzz::fuzz;
    use timtool::format::tim::FlashImage;

    pub fn main() {
        loop {
            fuzz!(|data: &[u8]| {
                if let Ok(flash_image) = FlashImage::parse(data) {
                    for image in flash_image.images() {
                        let start = image.flash_entry as usize;
                        assert_eq!(image.data, &data[start..start + image.data.len()]);
                    }
                }
            });
        }
    }
}

fn main() {
    #[cfg(not(windows))]
    fuzz::main();
}
