// PDF toolbox built on lopdf. Merge rebuilds the page tree at the object
// level; split/extract clone the source and drop unwanted pages; rotate and
// watermark edit page dictionaries in place.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

const WATERMARK_FONT: &str = "FwmHelv";

pub fn load(path: &Path) -> Result<Document> {
    Document::load(path).with_context(|| format!("failed to parse {}", path.display()))
}

/// Writes the document and reports the on-disk size for the ledger.
pub fn save(doc: &mut Document, path: &Path) -> Result<u64> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let file = doc
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(file.metadata().map(|m| m.len()).unwrap_or(0))
}

/// Parses selections like `1-3,5,8-10` into sorted, deduplicated 1-based
/// page numbers.
pub fn parse_page_ranges(input: &str) -> Result<Vec<u32>> {
    let mut pages = BTreeSet::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start
                .trim()
                .parse()
                .with_context(|| format!("invalid range start {:?}", start.trim()))?;
            let end: u32 = end
                .trim()
                .parse()
                .with_context(|| format!("invalid range end {:?}", end.trim()))?;
            if start == 0 {
                bail!("pages are numbered from 1");
            }
            if start > end {
                bail!("page range {start}-{end} is reversed");
            }
            pages.extend(start..=end);
        } else {
            let page: u32 = part
                .parse()
                .with_context(|| format!("invalid page number {part:?}"))?;
            if page == 0 {
                bail!("pages are numbered from 1");
            }
            pages.insert(page);
        }
    }

    if pages.is_empty() {
        bail!("no pages selected");
    }
    Ok(pages.into_iter().collect())
}

/// All pages of all inputs, in order, as one document.
pub fn merge(docs: Vec<Document>) -> Result<Document> {
    if docs.is_empty() {
        bail!("nothing to merge");
    }

    // Renumber every input into a disjoint id space, then pool the objects.
    let mut max_id = 1;
    let mut pages: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for mut doc in docs {
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for (_, object_id) in doc.get_pages() {
            let object = doc
                .get_object(object_id)
                .with_context(|| format!("missing page object {object_id:?}"))?
                .to_owned();
            pages.insert(object_id, object);
        }
        objects.extend(doc.objects);
    }

    let mut merged = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Dictionary)> = None;
    let mut page_tree: Option<(ObjectId, Dictionary)> = None;

    for (object_id, object) in objects {
        let kind = object_type(&object);
        if kind == b"Catalog" {
            if catalog.is_none() {
                if let Ok(dict) = object.as_dict() {
                    catalog = Some((object_id, dict.clone()));
                }
            }
        } else if kind == b"Pages" {
            if let Ok(dict) = object.as_dict() {
                match &mut page_tree {
                    Some((_, existing)) => existing.extend(dict),
                    None => page_tree = Some((object_id, dict.clone())),
                }
            }
        } else if kind == b"Page" || kind == b"Outlines" || kind == b"Outline" {
            // Pages are re-inserted below with a fixed Parent; outlines would
            // carry dangling references into the merged file.
        } else {
            merged.objects.insert(object_id, object);
        }
    }

    let (catalog_id, mut catalog_dict) =
        catalog.ok_or_else(|| anyhow!("no catalog found in the inputs"))?;
    let (pages_id, mut pages_dict) =
        page_tree.ok_or_else(|| anyhow!("no page tree found in the inputs"))?;

    pages_dict.set("Count", pages.len() as i64);
    pages_dict.set(
        "Kids",
        pages
            .keys()
            .map(|id| Object::Reference(*id))
            .collect::<Vec<_>>(),
    );
    merged
        .objects
        .insert(pages_id, Object::Dictionary(pages_dict));

    for (object_id, object) in pages {
        if let Ok(dict) = object.as_dict() {
            let mut dict = dict.clone();
            dict.set("Parent", pages_id);
            merged.objects.insert(object_id, Object::Dictionary(dict));
        }
    }

    catalog_dict.set("Pages", pages_id);
    catalog_dict.remove(b"Outlines");
    merged
        .objects
        .insert(catalog_id, Object::Dictionary(catalog_dict));

    merged.trailer.set("Root", catalog_id);
    merged.max_id = merged.objects.len() as u32;
    merged.renumber_objects();
    merged.compress();
    Ok(merged)
}

/// One single-page document per source page, in page order.
pub fn split(doc: &Document) -> Result<Vec<Document>> {
    let total = doc.get_pages().len() as u32;
    if total == 0 {
        bail!("document has no pages");
    }
    let mut parts = Vec::with_capacity(total as usize);
    for page in 1..=total {
        parts.push(keep_pages(doc, &[page]));
    }
    Ok(parts)
}

/// Keeps the listed 1-based pages; numbers past the end are skipped, not
/// errors.
pub fn extract(doc: &Document, pages: &[u32]) -> Result<Document> {
    let total = doc.get_pages().len() as u32;
    let keep: Vec<u32> = pages
        .iter()
        .copied()
        .filter(|p| (1..=total).contains(p))
        .collect();
    if keep.is_empty() {
        bail!("none of the requested pages exist in the document");
    }
    Ok(keep_pages(doc, &keep))
}

fn keep_pages(doc: &Document, keep: &[u32]) -> Document {
    let keep: HashSet<u32> = keep.iter().copied().collect();
    let total = doc.get_pages().len() as u32;
    let delete: Vec<u32> = (1..=total).filter(|p| !keep.contains(p)).collect();

    let mut out = doc.clone();
    out.delete_pages(&delete);
    out.prune_objects();
    out.renumber_objects();
    out.compress();
    out
}

/// Sets the absolute page rotation; must be a multiple of 90.
pub fn rotate(doc: &mut Document, degrees: i64) -> Result<()> {
    if degrees % 90 != 0 {
        bail!("rotation must be a multiple of 90 degrees");
    }
    let normalized = degrees.rem_euclid(360);

    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    if page_ids.is_empty() {
        bail!("document has no pages");
    }
    for page_id in page_ids {
        let dict = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| anyhow!("page {page_id:?} is not a dictionary: {e}"))?;
        dict.set("Rotate", normalized);
    }
    Ok(())
}

/// Stamps grey diagonal text onto every page via an appended content stream.
pub fn watermark(doc: &mut Document, text: &str) -> Result<()> {
    if text.is_empty() {
        bail!("watermark text must not be empty");
    }

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    if page_ids.is_empty() {
        bail!("document has no pages");
    }
    for page_id in page_ids {
        let (width, height) = page_size(doc, page_id);
        let stamp = stamp_stream(text, width, height)?;
        let stamp_id = doc.add_object(stamp);
        attach_to_page(doc, page_id, stamp_id, font_id)?;
    }
    Ok(())
}

fn object_type(object: &Object) -> Vec<u8> {
    if let Ok(dict) = object.as_dict() {
        if let Ok(Object::Name(name)) = dict.get(b"Type") {
            return name.clone();
        }
    }
    Vec::new()
}

fn real(v: f32) -> Object {
    Object::Real(v as _)
}

fn stamp_stream(text: &str, width: f32, height: f32) -> Result<Stream> {
    // 45 degrees, light grey, roughly centered.
    let cos = 0.7071;
    let x = width / 2.0 - 150.0;
    let y = height / 2.0;

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new("rg", vec![real(0.8), real(0.8), real(0.8)]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![WATERMARK_FONT.into(), 50.into()]),
            Operation::new(
                "Tm",
                vec![real(cos), real(cos), real(-cos), real(cos), real(x), real(y)],
            ),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ],
    };
    Ok(Stream::new(dictionary! {}, content.encode()?))
}

fn attach_to_page(
    doc: &mut Document,
    page_id: ObjectId,
    stamp_id: ObjectId,
    font_id: ObjectId,
) -> Result<()> {
    let mut page_dict = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|e| anyhow!("page {page_id:?} is not a dictionary: {e}"))?
        .clone();

    // Contents may be a single stream reference or an array of them.
    let mut contents: Vec<Object> = match page_dict.get(b"Contents") {
        Ok(Object::Reference(id)) => vec![Object::Reference(*id)],
        Ok(Object::Array(items)) => items.clone(),
        _ => vec![],
    };
    contents.push(Object::Reference(stamp_id));
    page_dict.set("Contents", contents);

    // The stamp's font must be reachable from the page's own Resources;
    // inherited resources are pulled down onto the page first.
    let mut resources: Dictionary = match page_dict.get(b"Resources") {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        Ok(Object::Reference(id)) => doc
            .get_dictionary(*id)
            .map(|d| d.clone())
            .unwrap_or_else(|_| Dictionary::new()),
        _ => inherited_resources(doc, &page_dict),
    };
    let mut fonts: Dictionary = match resources.get(b"Font") {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        Ok(Object::Reference(id)) => doc
            .get_dictionary(*id)
            .map(|d| d.clone())
            .unwrap_or_else(|_| Dictionary::new()),
        _ => Dictionary::new(),
    };
    fonts.set(WATERMARK_FONT, font_id);
    resources.set("Font", Object::Dictionary(fonts));
    page_dict.set("Resources", Object::Dictionary(resources));

    doc.objects.insert(page_id, Object::Dictionary(page_dict));
    Ok(())
}

fn inherited_resources(doc: &Document, page_dict: &Dictionary) -> Dictionary {
    if let Ok(Object::Reference(parent_id)) = page_dict.get(b"Parent") {
        if let Ok(parent) = doc.get_dictionary(*parent_id) {
            match parent.get(b"Resources") {
                Ok(Object::Dictionary(dict)) => return dict.clone(),
                Ok(Object::Reference(id)) => {
                    if let Ok(dict) = doc.get_dictionary(*id) {
                        return dict.clone();
                    }
                }
                _ => {}
            }
        }
    }
    Dictionary::new()
}

fn page_size(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    // US Letter when nothing better is known.
    let media_box = page_media_box(doc, page_id).unwrap_or([0.0, 0.0, 612.0, 792.0]);
    (media_box[2] - media_box[0], media_box[3] - media_box[1])
}

fn page_media_box(doc: &Document, page_id: ObjectId) -> Option<[f32; 4]> {
    let page = doc.get_dictionary(page_id).ok()?;
    let media = match page.get(b"MediaBox") {
        Ok(object) => object.clone(),
        Err(_) => {
            // One level of inheritance from the page tree node.
            let parent_id = match page.get(b"Parent") {
                Ok(Object::Reference(id)) => *id,
                _ => return None,
            };
            doc.get_dictionary(parent_id)
                .ok()?
                .get(b"MediaBox")
                .ok()?
                .clone()
        }
    };
    let media = match media {
        Object::Reference(id) => doc.get_object(id).ok()?.clone(),
        other => other,
    };

    let items = media.as_array().ok()?;
    if items.len() != 4 {
        return None;
    }
    let mut out = [0f32; 4];
    for (i, item) in items.iter().enumerate() {
        out[i] = number(item)?;
    }
    Some(out)
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}
