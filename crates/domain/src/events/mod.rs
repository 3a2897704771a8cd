//! 领域事件定义

pub mod domain_event;

pub use domain_event::{
    AppointmentEvent, DoctorRequestEvent, DomainEvent, MedicalRecordEvent,
};
