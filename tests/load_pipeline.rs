use approx::assert_abs_diff_eq;
use kinetree::{
    AssetError, Generation, LoadError, LoadEvent, LoadRequest, LoadStatus, MemorySource, MeshFormat, TreeError,
    Viewer, ViewerConfig,
};
use std::time::Duration;

const MESH_ROOT: &str = "robots/miro";

fn description(arm_mesh: &str, hand_mesh: &str) -> String {
    format!(
        r#"{{
  "name": "miro",
  "joints": [
    {{"name": "j1", "type": "revolute", "parent": "base", "child": "arm",
      "lower": -1.57, "upper": 1.57, "axis": [0, 0, 1], "xyz": [0, 0, 0.5], "rpy": [0, 0, 0]}},
    {{"name": "j2", "type": "revolute", "parent": "arm", "child": "hand",
      "lower": "-0.5", "upper": 0.5, "axis": [0, 1, 0], "xyz": [0, 0, 0.25], "rpy": [0, 0, 0]}}
  ],
  "links": [
    {{"name": "base", "visual": [{{"pos": [0, 0, 0], "rot": [0, 0, 0], "mesh": "none"}}]}},
    {{"name": "arm", "visual": [{{"pos": [0, 0, 0], "rot": [0, 0, 0], "mesh": "{arm_mesh}"}}]}},
    {{"name": "hand", "visual": [{{"pos": [0, 0, 0.1], "rot": [0, 0, 0], "mesh": "{hand_mesh}"}}]}}
  ]
}}"#
    )
}

const URDF: &str = r#"<?xml version="1.0"?>
<robot name="miro">
  <link name="base"/>
  <link name="arm">
    <visual>
      <origin xyz="0 0 0" rpy="0 0 0"/>
      <geometry><mesh filename="package://miro_description/meshes/arm.stl"/></geometry>
    </visual>
  </link>
  <link name="hand">
    <visual>
      <origin xyz="0 0 0.1" rpy="0 0 0"/>
      <geometry><mesh filename="hand.dae"/></geometry>
    </visual>
  </link>
  <joint name="j1" type="revolute">
    <parent link="base"/>
    <child link="arm"/>
    <origin xyz="0 0 0.5" rpy="0 0 0"/>
    <axis xyz="0 0 1"/>
    <limit lower="-1.57" upper="1.57" effort="1" velocity="1"/>
  </joint>
  <joint name="j2" type="revolute">
    <parent link="arm"/>
    <child link="hand"/>
    <origin xyz="0 0 0.25" rpy="0 0 0"/>
    <axis xyz="0 1 0"/>
    <limit lower="-0.5" upper="0.5" effort="1" velocity="1"/>
  </joint>
</robot>"#;

const COLLADA: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <asset>
    <unit name="centimeter" meter=""/>
    <up_axis>Z_UP</up_axis>
  </asset>
  <library_geometries>
    <geometry id="hand">
      <mesh>
        <source id="hand-positions">
          <float_array id="hand-positions-array" count="9">0 0 0 100 0 0 0 100 0</float_array>
        </source>
        <vertices id="hand-vertices">
          <input semantic="POSITION" source="#hand-positions"/>
        </vertices>
        <triangles count="1">
          <input semantic="VERTEX" source="#hand-vertices" offset="0"/>
          <p>0 1 2</p>
        </triangles>
      </mesh>
    </geometry>
  </library_geometries>
</COLLADA>"##;

/// Binary STL with a single triangle
fn stl() -> Vec<u8> {
    let mut bytes = vec![0u8; 80];
    bytes.extend(1u32.to_le_bytes());
    for value in [0.0f32, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
        bytes.extend(value.to_le_bytes());
    }
    bytes.extend([0u8, 0]);
    bytes
}

fn source() -> MemorySource {
    let mut source = MemorySource::new();
    source
        .insert("miro.json", description("arm.stl", "hand.dae"))
        .insert("miro.urdf", URDF)
        .insert("robots/miro/meshes/arm.stl", stl())
        .insert("robots/miro/meshes/hand.dae", COLLADA);
    source
}

fn config() -> ViewerConfig {
    ViewerConfig::from_toml_str("default_unit_scale = 0.01").unwrap()
}

fn released(events: &[LoadEvent], generation: Generation) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, LoadEvent::Released { generation: g, .. } if *g == generation))
        .count()
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_two_link_example() {
    let viewer = Viewer::new(source(), config());
    let report = viewer.load(LoadRequest::new("miro.json", MESH_ROOT)).await.unwrap();
    assert_eq!(report.status, LoadStatus::Complete);
    assert!(report.build.is_clean());

    viewer
        .with_active(|tree| {
            assert_eq!(tree.links()[tree.root_link()].name(), "base");
            assert_eq!(tree.root_joints(), &[0]);
            // `arm` and the origin of `j2` both hang below the post frame of `j1`
            let (_, post) = tree.joint_frames(0).unwrap();
            let (j2, _) = tree.joint_frames(1).unwrap();
            assert_eq!(tree.arena().node(post).unwrap().children(), &[tree.link_frame(1).unwrap(), j2]);
            assert_eq!(tree.mesh_count(), 2);
            assert_eq!(tree.metadata()["name"], "miro");
        })
        .unwrap();

    let angle = viewer
        .with_active_mut(|tree| {
            tree.set_joint_by_unit_scaling(0, 1.0).unwrap();
            tree.joints()[0].angle()
        })
        .unwrap();
    assert_eq!(angle, 1.57);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_collada_unit_repair_and_scaling() {
    let viewer = Viewer::new(source(), config());
    viewer.load(LoadRequest::new("miro.json", MESH_ROOT)).await.unwrap();
    viewer
        .with_active(|tree| {
            let (asset, _) = tree.mesh(2).unwrap();
            assert_eq!(asset.format(), MeshFormat::Collada);
            assert_eq!(asset.unit_scale(), 0.01);
            assert_abs_diff_eq!(asset.vertices()[1].x, 1.0, epsilon = 1e-6);
        })
        .unwrap();
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_stale_description_is_released_once() {
    let mut source = source();
    source
        .insert("old.json", description("arm.stl", "hand.dae"))
        .delay("old.json", Duration::from_millis(100))
        .delay("miro.json", Duration::from_millis(10));
    let viewer = Viewer::new(source, config());

    let (old, new) = tokio::join!(
        viewer.load(LoadRequest::new("old.json", MESH_ROOT)),
        viewer.load(LoadRequest::new("miro.json", MESH_ROOT)),
    );
    let (old, new) = (old.unwrap(), new.unwrap());
    assert_eq!(old.status, LoadStatus::Superseded);
    assert_eq!(new.status, LoadStatus::Complete);
    assert_eq!(viewer.active_generation(), Some(new.generation));

    let events = viewer.events();
    assert!(!events
        .iter()
        .any(|e| matches!(e, LoadEvent::Activated { generation, .. } if *generation == old.generation)));
    assert_eq!(released(&events, old.generation), 1);
    assert_eq!(released(&events, new.generation), 0);
    // Fetches are never aborted
    assert_eq!(viewer.source().fetches(), 4);
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_stale_meshes_are_dropped() {
    let mut source = source();
    source
        .insert("slow/miro.json", description("arm.stl", "hand.dae"))
        .insert("slow/meshes/arm.stl", stl())
        .insert("slow/meshes/hand.dae", COLLADA)
        .delay("slow/meshes/arm.stl", Duration::from_millis(100))
        .delay("slow/meshes/hand.dae", Duration::from_millis(100));
    let viewer = Viewer::new(source, config());

    let (old, new) = tokio::join!(viewer.load(LoadRequest::new("slow/miro.json", "slow")), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        viewer.load(LoadRequest::new("miro.json", MESH_ROOT)).await
    });
    let (old, new) = (old.unwrap(), new.unwrap());
    assert_eq!(old.status, LoadStatus::Superseded);
    assert_eq!(new.status, LoadStatus::Complete);

    let events = viewer.events();
    // The old tree was active for a while and is released by the new activation
    assert!(events
        .iter()
        .any(|e| matches!(e, LoadEvent::Activated { generation, .. } if *generation == old.generation)));
    assert_eq!(released(&events, old.generation), 1);
    let dropped = events
        .iter()
        .filter(|e| matches!(e, LoadEvent::MeshDiscarded { generation, .. } if *generation == old.generation))
        .count();
    assert_eq!(dropped, 2);
    assert_eq!(viewer.with_active(|tree| tree.mesh_count()), Some(2));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_unsupported_format_keeps_siblings() {
    let mut source = source();
    source.insert("obj.json", description("arm.stl", "hand.obj"));
    let viewer = Viewer::new(source, config());

    let result = viewer.load(LoadRequest::new("obj.json", MESH_ROOT)).await;
    match result {
        Err(LoadError::UnsupportedFormat { link, source }) => {
            assert_eq!(link, "hand");
            assert!(matches!(source, AssetError::UnsupportedFormat { ref extension, .. } if extension == "obj"));
        }
        other => panic!("expected an unsupported format, got {other:?}"),
    }
    viewer
        .with_active(|tree| {
            assert!(tree.mesh(1).is_some());
            assert!(tree.mesh(2).is_none());
        })
        .unwrap();
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_missing_mesh_is_partial() {
    let mut source = source();
    source.insert("missing.json", description("gone.stl", "hand.dae"));
    let viewer = Viewer::new(source, config());

    let report = viewer.load(LoadRequest::new("missing.json", MESH_ROOT)).await.unwrap();
    assert_eq!(
        report.status,
        LoadStatus::Partial {
            failed: vec!["arm".to_string()]
        }
    );
    assert_eq!(viewer.with_active(|tree| tree.mesh_count()), Some(1));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_no_root_fails() {
    let mut source = MemorySource::new();
    source.insert(
        "loop.json",
        r#"{"joints": [{"name": "ab", "parent": "a", "child": "b"}, {"name": "ba", "parent": "b", "child": "a"}],
            "links": [{"name": "a"}, {"name": "b"}]}"#,
    );
    let viewer = Viewer::new(source, ViewerConfig::default());
    let result = viewer.load(LoadRequest::new("loop.json", "")).await;
    assert!(matches!(result, Err(LoadError::Tree(TreeError::NoRoot))));
    assert!(viewer.active_generation().is_none());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_missing_description_fails() {
    let viewer = Viewer::new(MemorySource::new(), ViewerConfig::default());
    let result = viewer.load(LoadRequest::new("nothing.json", "")).await;
    assert!(matches!(result, Err(LoadError::DescriptionFetch { .. })));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_urdf_matches_json() {
    let json = Viewer::new(source(), config());
    json.load(LoadRequest::new("miro.json", MESH_ROOT)).await.unwrap();
    let urdf = Viewer::new(source(), config());
    let report = urdf.load(LoadRequest::new("miro.urdf", MESH_ROOT)).await.unwrap();
    assert_eq!(report.status, LoadStatus::Complete);

    let angles = [0.3, -0.2];
    let expected = json
        .with_active_mut(|tree| {
            tree.set_angles(&angles).unwrap();
            tree.native_transforms()
        })
        .unwrap();
    let actual = urdf
        .with_active_mut(|tree| {
            assert_eq!(tree.joints()[1].limits(), (-0.5, 0.5));
            assert_eq!(tree.mesh_count(), 2);
            tree.set_angles(&angles).unwrap();
            tree.native_transforms()
        })
        .unwrap();
    assert_eq!(expected.len(), actual.len());
    for (expected, actual) in expected.iter().zip(&actual) {
        assert_abs_diff_eq!(*expected, *actual, epsilon = 1e-12);
    }
}
