//! Deterministic fast-storage paths for orchestrated assets.

use crate::asset_id::AssetId;

/// Names longer than this are sharded into nested directories.
const SHARD_THRESHOLD: usize = 8;

/// Expand a folder template for an asset.
///
/// Supported replacements are `{root}`, `{customer}`, `{space}`,
/// `{image-dir}` and `{image}`.
pub fn expand_template(template: &str, root: &str, asset_id: &AssetId) -> String {
    template
        .replace("{root}", root.trim_end_matches('/'))
        .replace("{customer}", &asset_id.customer().to_string())
        .replace("{space}", &asset_id.space().to_string())
        .replace("{image-dir}", &image_dir(asset_id.name()))
        .replace("{image}", asset_id.name())
}

/// Directory used for an image name.
///
/// Short names are used as-is. Longer names get the first eight characters
/// split into four two-character directories ahead of the full name, which
/// keeps any single directory from growing too large.
pub fn image_dir(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= SHARD_THRESHOLD {
        return name.to_string();
    }

    let mut dir = String::with_capacity(name.len() + SHARD_THRESHOLD + 4);
    for pair in chars[..SHARD_THRESHOLD].chunks(2) {
        dir.extend(pair);
        dir.push('/');
    }
    dir.push_str(name);
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "{root}/{customer}/{space}/{image-dir}/{image}.jp2";

    #[test]
    fn test_short_name_unsharded() {
        let id = AssetId::new(10, 20, "foobarba").unwrap();
        assert_eq!(
            expand_template(TEMPLATE, "/nas", &id),
            "/nas/10/20/foobarba/foobarba.jp2"
        );
    }

    #[test]
    fn test_long_name_sharded() {
        let id = AssetId::new(10, 20, "foobarbazqux").unwrap();
        assert_eq!(
            expand_template(TEMPLATE, "/nas/", &id),
            "/nas/10/20/fo/ob/ar/ba/foobarbazqux/foobarbazqux.jp2"
        );
    }

    #[test]
    fn test_template_without_image_dir() {
        let id = AssetId::new(1, 2, "foobarbazqux").unwrap();
        assert_eq!(
            expand_template("{root}/{customer}/{space}/{image}", "folder", &id),
            "folder/1/2/foobarbazqux"
        );
    }

    #[test]
    fn test_image_dir_multibyte_names() {
        assert_eq!(image_dir("ééééééééé"), "éé/éé/éé/éé/ééééééééé");
    }
}
