pub mod fixtures;

#[cfg(test)]
mod hls_pipeline_tests;
#[cfg(test)]
mod signaling_wire_tests;
#[cfg(test)]
mod room_api_tests;
#[cfg(test)]
mod media_flow_tests;
