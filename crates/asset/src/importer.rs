//! Insert parsed OBJ objects into a scene.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use common::CoreResult;
use corelib::id::{CollectionId, ObjectId, RecalcFlags};
use corelib::scene::{Main, ObjectData};

use crate::dump::write_obj_data;
use crate::mesh::mesh_from_raw;
use crate::obj::load_raw_from_path;
use crate::raw::RawObject;

pub const DEFAULT_COLLECTION_NAME: &str = "OBJ import collection";

#[derive(Clone, Debug)]
pub struct ObjImportParams {
    pub filepath: PathBuf,
    /// Name of the collection created for the imported objects.
    pub collection_name: String,
    /// Dump parsed data to stdout before building meshes.
    pub print_data: bool,
}

impl Default for ObjImportParams {
    fn default() -> Self {
        Self {
            filepath: PathBuf::new(),
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            print_data: false,
        }
    }
}

impl ObjImportParams {
    pub fn new(filepath: impl Into<PathBuf>) -> Self {
        Self {
            filepath: filepath.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportReport {
    pub collection: CollectionId,
    pub objects: Vec<ObjectId>,
    pub vertices: usize,
    pub faces: usize,
}

/// Create one mesh object per raw object inside a new collection under the
/// scene's master collection.
pub fn make_objects(
    main: &mut Main,
    collection_name: &str,
    raw_objects: &[RawObject],
) -> CoreResult<ImportReport> {
    let collection = main.add_collection(Some(main.master_collection()), collection_name)?;

    let mut report = ImportReport {
        collection,
        objects: Vec::with_capacity(raw_objects.len()),
        vertices: 0,
        faces: 0,
    };
    for raw in raw_objects {
        let mesh = mesh_from_raw(raw);
        report.vertices += mesh.vertices.len();
        report.faces += mesh.polys.len();

        let ob = main.add_object(&raw.name, ObjectData::Mesh(mesh));
        main.collection_link_object(collection, ob)?;
        report.objects.push(ob);
    }

    main.id_fake_user_set(collection)?;
    main.id_tag_update(collection, RecalcFlags::COPY_ON_WRITE)?;
    main.relations_tag_update();
    Ok(report)
}

/// Parse the file named by `params` and add its objects to `main`.
pub fn importer_main(main: &mut Main, params: &ObjImportParams) -> Result<ImportReport> {
    log::info!("Importing OBJ {}", params.filepath.display());
    let raw_objects = load_raw_from_path(&params.filepath)?;

    if params.print_data {
        let stdout = io::stdout();
        write_obj_data(&mut stdout.lock(), &raw_objects).context("Failed to print OBJ data")?;
    }

    let report = make_objects(main, &params.collection_name, &raw_objects)?;
    log::info!(
        "Imported {} object(s), {} vertices, {} faces",
        report.objects.len(),
        report.vertices,
        report.faces
    );
    Ok(report)
}
