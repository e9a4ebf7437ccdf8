//! OpenCV 级联 XML（`haarcascade_*.xml`，新格式）读取
//!
//! Only stump-based HAAR cascades are accepted: every weak classifier must
//! be a single split (`internalNodes` = left right featureIdx threshold,
//! two `leafValues`), and tilted features are rejected.

use std::str::FromStr;

use roxmltree::{Document, Node};

use super::cascade::{CascadeStage, HaarCascade, WeakClassifier, WeightedRect};
use crate::core::video::error::VideoError;

impl HaarCascade {
    pub fn from_opencv_xml(xml: &str) -> Result<Self, VideoError> {
        let doc = Document::parse(xml)?;
        let root = doc
            .descendants()
            .find(|n| n.has_tag_name("cascade"))
            .ok_or_else(|| invalid("missing <cascade> element"))?;

        if let Some(kind) = root.children().find(|n| n.has_tag_name("featureType")).and_then(|n| n.text()) {
            if kind.trim() != "HAAR" {
                return Err(invalid(format!("unsupported feature type {}", kind.trim())));
            }
        }

        let window_width = single(child(root, "width")?)?;
        let window_height = single(child(root, "height")?)?;

        let features = elements(child(root, "features")?)
            .map(parse_feature)
            .collect::<Result<Vec<_>, _>>()?;
        let stages = elements(child(root, "stages")?)
            .map(|stage| parse_stage(stage, &features))
            .collect::<Result<Vec<_>, _>>()?;

        let cascade = HaarCascade {
            window_width,
            window_height,
            stages,
        };
        cascade.validate()?;
        Ok(cascade)
    }
}

fn parse_stage(stage: Node, features: &[Vec<WeightedRect>]) -> Result<CascadeStage, VideoError> {
    let threshold = single(child(stage, "stageThreshold")?)?;
    let classifiers = elements(child(stage, "weakClassifiers")?)
        .map(|weak| -> Result<WeakClassifier, VideoError> {
            let nodes = child(weak, "internalNodes")?;
            let [_left, _right, index, threshold] = fixed::<4>(nodes, "internalNodes")?;
            let [left_value, right_value] = fixed::<2>(child(weak, "leafValues")?, "leafValues")?;

            let rects = (index >= 0.0)
                .then(|| features.get(index as usize))
                .flatten()
                .ok_or_else(|| invalid(format!("feature index {} out of range", index)))?;
            Ok(WeakClassifier {
                rects: rects.clone(),
                threshold,
                left_value,
                right_value,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CascadeStage { threshold, classifiers })
}

fn parse_feature(feature: Node) -> Result<Vec<WeightedRect>, VideoError> {
    if let Some(tilted) = feature.children().find(|n| n.has_tag_name("tilted")) {
        if tilted.text().map(str::trim) == Some("1") {
            return Err(invalid("tilted features are not supported"));
        }
    }

    elements(child(feature, "rects")?)
        .map(|rect| -> Result<WeightedRect, VideoError> {
            let [x, y, width, height, weight] = fixed::<5>(rect, "rect")?;
            if x < 0.0 || y < 0.0 || width < 0.0 || height < 0.0 {
                return Err(invalid("feature rect has negative geometry"));
            }
            Ok(WeightedRect {
                x: x as u32,
                y: y as u32,
                width: width as u32,
                height: height as u32,
                weight,
            })
        })
        .collect()
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>, VideoError> {
    node.children()
        .find(|n| n.has_tag_name(name))
        .ok_or_else(|| invalid(format!("missing <{}> under <{}>", name, node.tag_name().name())))
}

fn numbers<T: FromStr>(node: Node) -> Result<Vec<T>, VideoError> {
    node.text()
        .unwrap_or_default()
        .split_whitespace()
        .map(|token| {
            token
                .parse::<T>()
                .map_err(|_| invalid(format!("bad number {:?} in <{}>", token, node.tag_name().name())))
        })
        .collect()
}

fn single<T: FromStr>(node: Node) -> Result<T, VideoError> {
    let mut values = numbers::<T>(node)?;
    match values.len() {
        1 => Ok(values.remove(0)),
        n => Err(invalid(format!("<{}> holds {} values, expected 1", node.tag_name().name(), n))),
    }
}

fn fixed<const N: usize>(node: Node, what: &str) -> Result<[f32; N], VideoError> {
    let values = numbers::<f32>(node)?;
    let len = values.len();
    <[f32; N]>::try_from(values)
        .map_err(|_| invalid(format!("{} holds {} values, expected {} (only stump classifiers)", what, len, N)))
}

fn invalid(message: impl Into<String>) -> VideoError {
    VideoError::InvalidCascade(message.into())
}
