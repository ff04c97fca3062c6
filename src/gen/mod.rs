//! Generated protobuf types and gRPC service stubs.

pub mod copilot {
    pub mod v1 {
        tonic::include_proto!("copilot.v1");
    }

    pub mod scheduler {
        pub mod v1 {
            tonic::include_proto!("copilot.scheduler.v1");
        }
    }
}
