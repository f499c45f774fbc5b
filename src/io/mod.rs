mod preparer;
mod ring;
mod rotation;
mod write_file;
mod write_op;

pub use preparer::{PreparedBuffer, PreparedWrite, WritePreparer, STAGING_BUFFER_SIZE};
pub use ring::IoRing;
pub use rotation::FileRotator;
pub use write_file::WriteOnlyFile;
pub use write_op::{InFlightTable, WriteOp};
