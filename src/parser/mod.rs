pub mod decoder;
pub mod event;
pub mod frame;
pub mod gps;
pub mod header;
pub mod heuristic;
pub mod main;
pub mod shapes;
pub mod stream;

pub use decoder::{run_decoder, DecoderOutput, DecoderState, OutputChannel};
pub use event::{detect_anomalies, AnomalyDetector, AnomalyReport};
pub use frame::{normalize_decoder_output, normalize_document};
pub use header::{parse_log_header, HEADER_LEN};
pub use heuristic::{build_heuristic_flight_log, extract_heuristic_points, CoordinateLayout};
pub use main::*;
pub use shapes::{parse_decoder_output, DecoderDocument, LogDetails, OutputShape};
pub use stream::LogDataStream;
