//! OData addressing scheme of the archive hub.
//!
//! A product download URI has the shape
//! `<root>/Products('<uuid>')/$value`. Every other resource of the product
//! hangs off the same `Products('<uuid>')` node:
//!
//! ```text
//! <root>/Products('<uuid>')/Checksum/Value/$value
//! <root>/Products('<uuid>')/Nodes('<title>.SAFE')/Nodes('manifest.safe')/$value
//! <root>/Products('<uuid>')/Nodes('<title>.SAFE')/Nodes('GRANULE')/.../Nodes('<file>')/$value
//! ```

/// Suffix that selects the raw value of a node.
const VALUE_SUFFIX: &str = "$value";

/// Name of the manifest file inside a product.
pub const MANIFEST_NAME: &str = "manifest.safe";

/// The product node a download URI points into (the URI minus its last
/// path segment).
pub fn product_node(download_uri: &str) -> &str {
    download_uri
        .trim_end_matches('/')
        .rsplit_once('/')
        .map(|(node, _)| node)
        .unwrap_or(download_uri)
}

/// URI of the published checksum of the whole product archive.
pub fn checksum_uri(download_uri: &str) -> String {
    format!("{}/Checksum/Value/{}", product_node(download_uri), VALUE_SUFFIX)
}

fn safe_node(download_uri: &str, title: &str) -> String {
    format!("{}/Nodes('{}.SAFE')", product_node(download_uri), title)
}

/// URI of the product's manifest.
pub fn manifest_uri(download_uri: &str, title: &str) -> String {
    format!(
        "{}/Nodes('{}')/{}",
        safe_node(download_uri, title),
        MANIFEST_NAME,
        VALUE_SUFFIX
    )
}

/// URI of a single file of the product.
///
/// `relative_path` is a manifest location such as `./GRANULE/L1C_T31TEJ/IMG_DATA/B02.jp2`;
/// the leading `.` segment is dropped and every remaining segment becomes a
/// nested node.
pub fn part_uri(download_uri: &str, title: &str, relative_path: &str) -> String {
    let mut uri = safe_node(download_uri, title);
    for segment in relative_path
        .split('/')
        .skip(1)
        .filter(|segment| !segment.is_empty())
    {
        uri.push_str(&format!("/Nodes('{}')", segment));
    }
    uri.push('/');
    uri.push_str(VALUE_SUFFIX);
    uri
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCT: &str =
        "https://hub.example/dhus/odata/v1/Products('0282b16c-310a-408b-aad6-85fdfa02a5da')/$value";
    const NODE: &str =
        "https://hub.example/dhus/odata/v1/Products('0282b16c-310a-408b-aad6-85fdfa02a5da')";

    #[test]
    fn test_product_node() {
        assert_eq!(product_node(PRODUCT), NODE);
    }

    #[test]
    fn test_checksum_uri() {
        assert_eq!(
            checksum_uri(PRODUCT),
            format!("{}/Checksum/Value/$value", NODE)
        );
    }

    #[test]
    fn test_manifest_uri() {
        assert_eq!(
            manifest_uri(PRODUCT, "S2A_PRODUCT"),
            format!("{}/Nodes('S2A_PRODUCT.SAFE')/Nodes('manifest.safe')/$value", NODE)
        );
    }

    #[test]
    fn test_part_uri_maps_segments_to_nodes() {
        assert_eq!(
            part_uri(PRODUCT, "S2A_PRODUCT", "./HTML/UserProduct_index.html"),
            format!(
                "{}/Nodes('S2A_PRODUCT.SAFE')/Nodes('HTML')/Nodes('UserProduct_index.html')/$value",
                NODE
            )
        );
    }
}
