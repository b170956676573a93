pub mod exports;
pub mod provision;
pub mod status;

use stratus_cloud::ResourceKind;

/// Turn command-line kind names into a run order.
///
/// `all` selects every kind. Duplicates collapse and the result always
/// follows the canonical order, whatever order the names were given in.
pub fn parse_kinds(names: &[String]) -> anyhow::Result<Vec<ResourceKind>> {
    let mut kinds = Vec::new();
    for name in names {
        if name.eq_ignore_ascii_case("all") {
            kinds.extend(ResourceKind::ALL);
            continue;
        }
        let kind: ResourceKind = name.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        kinds.push(kind);
    }
    if kinds.is_empty() {
        anyhow::bail!("no resource kind given");
    }

    Ok(ResourceKind::ALL
        .into_iter()
        .filter(|k| kinds.contains(k))
        .collect())
}
