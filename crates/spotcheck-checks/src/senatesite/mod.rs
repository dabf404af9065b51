//! NYSenate.gov website dumps.
//!
//! The website exports its bills, calendars and agendas as multi-fragment
//! JSON dumps. Each fragment is a `{"nodes": [...]}` document; the records
//! below are the typed form of those nodes.

mod agenda;
mod bill;
mod calendar;

pub use agenda::{SenateSiteAgenda, SenateSiteAgendaChecker, SenateSiteAgendaParser};
pub use bill::{
  SenateSiteBill, SenateSiteBillAction, SenateSiteBillChecker, SenateSiteBillParser,
};
pub use calendar::{
  SenateSiteCalendar, SenateSiteCalendarChecker, SenateSiteCalendarParser,
};
