//! URDF XML input.
//!
//! Reads the subset of URDF the viewer needs (links with visuals, joints with origin, axis and
//! limits) into the same [Description] the JSON reader produces. Numeric attributes stay loosely
//! typed so malformed values are coerced later, exactly like JSON input.

use crate::description::{Description, JointDescription, LinkDescription, VisualDescription};
use crate::errors::DescriptionError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;

/// Element currently open below a `<link>`. Only `<origin>` inside a visual is relevant.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Body,
    Visual,
    Ignored,
}

/// Parse a URDF document into a [Description].
///
/// The robot's `name` attribute ends up in the metadata.
pub fn parse_urdf_str(xml: &str) -> Result<Description, DescriptionError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut description = Description::default();
    let mut seen_robot = false;
    let mut link: Option<LinkDescription> = None;
    let mut joint: Option<JointDescription> = None;
    let mut section = Section::Body;
    // Only `<link>` and `<joint>` directly below `<robot>` describe the tree; `<transmission>`
    // and `<gazebo>` reuse the names
    let mut depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => {
                let top_level = depth == 1;
                depth += 1;
                match e.name().as_ref() {
                    b"robot" => {
                        seen_robot = true;
                        if let Some(name) = attribute(e, "name")? {
                            description.metadata.insert("name".to_string(), Value::from(name));
                        }
                    }
                    b"link" if top_level => link = Some(new_link(e)?),
                    b"joint" if top_level => joint = Some(new_joint(e)?),
                    b"visual" if link.is_some() => {
                        section = Section::Visual;
                        if let Some(link) = link.as_mut() {
                            link.visual.push(VisualDescription::default());
                        }
                    }
                    b"collision" | b"inertial" => section = Section::Ignored,
                    _ => element(e, link.as_mut(), joint.as_mut(), section)?,
                }
            }
            Event::Empty(ref e) => match e.name().as_ref() {
                b"link" if depth == 1 => description.links.push(new_link(e)?),
                _ => element(e, link.as_mut(), joint.as_mut(), section)?,
            },
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                match e.name().as_ref() {
                    b"link" if depth == 1 => description.links.extend(link.take()),
                    b"joint" if depth == 1 => description.joints.extend(joint.take()),
                    b"visual" | b"collision" | b"inertial" => section = Section::Body,
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_robot {
        return Err(DescriptionError::MissingElement {
            element: "robot".to_string(),
            context: "URDF document".to_string(),
        });
    }
    Ok(description)
}

fn new_link(e: &BytesStart) -> Result<LinkDescription, DescriptionError> {
    Ok(LinkDescription {
        name: attribute(e, "name")?.unwrap_or_default(),
        visual: vec![],
    })
}

fn new_joint(e: &BytesStart) -> Result<JointDescription, DescriptionError> {
    Ok(JointDescription {
        name: attribute(e, "name")?.unwrap_or_default(),
        joint_type: attribute(e, "type")?.unwrap_or_default(),
        ..Default::default()
    })
}

/// Handles a nested element of a link or joint
fn element(
    e: &BytesStart,
    link: Option<&mut LinkDescription>,
    joint: Option<&mut JointDescription>,
    section: Section,
) -> Result<(), DescriptionError> {
    if let Some(joint) = joint {
        match e.name().as_ref() {
            b"parent" => joint.parent = attribute(e, "link")?.unwrap_or_default(),
            b"child" => joint.child = attribute(e, "link")?.unwrap_or_default(),
            b"origin" => {
                joint.xyz = triple(attribute(e, "xyz")?);
                joint.rpy = triple(attribute(e, "rpy")?);
            }
            b"axis" => joint.axis = triple(attribute(e, "xyz")?),
            b"limit" => {
                joint.lower = attribute(e, "lower")?.map(Value::from).unwrap_or_default();
                joint.upper = attribute(e, "upper")?.map(Value::from).unwrap_or_default();
            }
            _ => {}
        }
        return Ok(());
    }

    let Some(visual) = link.and_then(|l| l.visual.last_mut()) else {
        return Ok(());
    };
    if section != Section::Visual {
        return Ok(());
    }
    match e.name().as_ref() {
        b"origin" => {
            visual.pos = triple(attribute(e, "xyz")?);
            visual.rot = triple(attribute(e, "rpy")?);
        }
        b"mesh" => visual.mesh = attribute(e, "filename")?,
        shape @ (b"box" | b"cylinder" | b"sphere" | b"capsule") => {
            visual.mesh = Some(String::from_utf8_lossy(shape).into_owned());
        }
        _ => {}
    }
    Ok(())
}

fn attribute(e: &BytesStart, name: &str) -> Result<Option<String>, DescriptionError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Space separated triple as a loosely typed JSON array. Unparsable parts stay strings and are
/// coerced later.
fn triple(text: Option<String>) -> Value {
    let Some(text) = text else {
        return Value::Null;
    };
    Value::Array(
        text.split_whitespace()
            .map(|part| match part.parse::<f64>() {
                Ok(x) if x.is_finite() => Value::from(x),
                _ => Value::from(part),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MeshRef;
    use crate::ViewerConfig;
    use approx::assert_abs_diff_eq;

    const URDF: &str = r#"<?xml version="1.0"?>
<robot name="miro">
  <link name="base">
    <inertial><origin xyz="9 9 9"/><mass value="1"/></inertial>
    <visual>
      <origin xyz="0 0 0.05" rpy="0 0 0"/>
      <geometry><mesh filename="package://miro_description/meshes/base.dae"/></geometry>
    </visual>
    <collision><origin xyz="7 7 7"/><geometry><box size="1 1 1"/></geometry></collision>
  </link>
  <link name="arm">
    <visual><geometry><cylinder radius="0.1" length="1"/></geometry></visual>
  </link>
  <link name="tip"/>
  <joint name="j1" type="revolute">
    <parent link="base"/>
    <child link="arm"/>
    <origin xyz="0 0 0.5" rpy="0 0 1.5708"/>
    <axis xyz="0 0 1"/>
    <limit lower="-1.57" upper="1.57" effort="1" velocity="1"/>
  </joint>
  <joint name="j2" type="fixed">
    <parent link="arm"/>
    <child link="tip"/>
    <origin xyz="0 0 oops"/>
  </joint>
</robot>"#;

    #[test_log::test]
    fn test_parse_urdf() {
        let description = parse_urdf_str(URDF).unwrap();
        assert_eq!(description.metadata.get("name"), Some(&Value::from("miro")));
        assert_eq!(description.links.len(), 3);
        assert_eq!(description.joints.len(), 2);

        let config = ViewerConfig::default();
        let links = description.links(&config);
        assert_eq!(links[0].mesh(), &MeshRef::Asset("meshes/base.dae".to_string()));
        // Origins of inertial and collision elements are ignored
        assert_abs_diff_eq!(links[0].visual().translation.vector.z, 0.05);
        assert_eq!(links[1].mesh(), &MeshRef::Primitive("cylinder".to_string()));
        assert_eq!(links[2].mesh(), &MeshRef::None);

        let joints = description.joints();
        assert_eq!(joints[0].parent_name(), "base");
        assert_eq!(joints[0].child_name(), "arm");
        assert_eq!(joints[0].limits(), (-1.57, 1.57));
        assert_eq!(joints[0].axis(), [0.0, 0.0, 1.0]);
        assert_eq!(joints[1].origin().translation.vector.as_slice(), &[0.0, 0.0, 0.0]);
    }

    #[test_log::test]
    fn test_transmission_joints_ignored() {
        let urdf = r#"<robot name="r">
  <link name="a"/>
  <link name="b"/>
  <joint name="j" type="revolute">
    <parent link="a"/>
    <child link="b"/>
  </joint>
  <transmission name="t">
    <type>transmission_interface/SimpleTransmission</type>
    <joint name="j"><hardwareInterface>EffortJointInterface</hardwareInterface></joint>
    <actuator name="m"><mechanicalReduction>1</mechanicalReduction></actuator>
  </transmission>
  <gazebo reference="b"><material>Gazebo/Grey</material></gazebo>
</robot>"#;
        let description = parse_urdf_str(urdf).unwrap();
        assert_eq!(description.links.len(), 2);
        assert_eq!(description.joints.len(), 1);
        let joints = description.joints();
        assert_eq!((joints[0].parent_name(), joints[0].child_name()), ("a", "b"));
    }

    #[test_log::test]
    fn test_missing_robot() {
        assert!(matches!(
            parse_urdf_str("<model/>"),
            Err(DescriptionError::MissingElement { .. })
        ));
    }
}
