pub mod dicom;
pub mod normalize;
pub mod preprocess;
