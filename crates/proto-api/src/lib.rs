//! Generated protobuf definitions for the file storage API.
//!
//! Both the client and the server side of `storage.v1.FileService` are
//! generated; the server binary uses the server half and its integration
//! tests drive it through the client.

pub mod storage_pb {
    tonic::include_proto!("storage.v1");
}

pub mod descriptor {
    pub const STORAGE_FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("storage_descriptor");
}
