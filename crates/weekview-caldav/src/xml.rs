//! WebDAV XML request bodies and multistatus response parsing.

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, Event};

use chrono::{DateTime, Utc};
use std::io::Cursor;

/// DAV namespace.
pub const DAV_NS: &str = "DAV:";
/// CalDAV namespace.
pub const CALDAV_NS: &str = "urn:ietf:params:xml:ns:caldav";

/// A calendar collection found in a PROPFIND response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCalendar {
    /// The collection's href (path).
    pub href: String,
    /// The display name, if the server exposed one.
    pub display_name: Option<String>,
}

/// Builds a PROPFIND body asking for displayname and resourcetype.
///
/// Resourcetype is what lets us tell calendar collections apart from plain
/// WebDAV collections in the response.
pub fn propfind_calendars_body() -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut propfind = BytesStart::new("d:propfind");
    propfind.push_attribute(("xmlns:d", DAV_NS));
    propfind.push_attribute(("xmlns:c", CALDAV_NS));
    writer.write_event(Event::Start(propfind)).unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("d:prop")))
        .unwrap();
    write_empty_element(&mut writer, "d:displayname");
    write_empty_element(&mut writer, "d:resourcetype");
    writer
        .write_event(Event::End(BytesEnd::new("d:prop")))
        .unwrap();

    writer
        .write_event(Event::End(BytesEnd::new("d:propfind")))
        .unwrap();

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).unwrap()
}

/// Builds a calendar-query REPORT body with a VEVENT time-range filter.
///
/// The time-range filter makes the server expand recurring events into
/// concrete occurrences inside `[start, end)`.
pub fn calendar_query_body(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut query = BytesStart::new("c:calendar-query");
    query.push_attribute(("xmlns:d", DAV_NS));
    query.push_attribute(("xmlns:c", CALDAV_NS));
    writer.write_event(Event::Start(query)).unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("d:prop")))
        .unwrap();
    write_empty_element(&mut writer, "d:getetag");
    write_empty_element(&mut writer, "c:calendar-data");
    writer
        .write_event(Event::End(BytesEnd::new("d:prop")))
        .unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("c:filter")))
        .unwrap();

    let mut vcal_filter = BytesStart::new("c:comp-filter");
    vcal_filter.push_attribute(("name", "VCALENDAR"));
    writer.write_event(Event::Start(vcal_filter)).unwrap();

    let mut vevent_filter = BytesStart::new("c:comp-filter");
    vevent_filter.push_attribute(("name", "VEVENT"));
    writer.write_event(Event::Start(vevent_filter)).unwrap();

    let mut time_range = BytesStart::new("c:time-range");
    time_range.push_attribute(("start", format_caldav_datetime(start).as_str()));
    time_range.push_attribute(("end", format_caldav_datetime(end).as_str()));
    writer.write_event(Event::Empty(time_range)).unwrap();

    writer
        .write_event(Event::End(BytesEnd::new("c:comp-filter")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("c:comp-filter")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("c:filter")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("c:calendar-query")))
        .unwrap();

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).unwrap()
}

/// Parses a PROPFIND multistatus response into discovered calendars.
///
/// Only responses whose resourcetype includes a `calendar` element are
/// kept; plain collections (address books, the principal itself) are
/// dropped.
pub fn parse_propfind_response(xml: &str) -> Vec<DiscoveredCalendar> {
    let mut calendars = Vec::new();

    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut current_href: Option<String> = None;
    let mut current_displayname: Option<String> = None;
    let mut is_calendar = false;
    let mut in_response = false;
    let mut current_element: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match local_name(&name) {
                    "response" => {
                        in_response = true;
                        current_href = None;
                        current_displayname = None;
                        is_calendar = false;
                    }
                    "href" | "displayname" => {
                        current_element = Some(local_name(&name).to_string());
                    }
                    "calendar" => {
                        is_calendar = true;
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if local_name(&name) == "response" && in_response {
                    if is_calendar && let Some(href) = current_href.take() {
                        calendars.push(DiscoveredCalendar {
                            href,
                            display_name: current_displayname.take(),
                        });
                    }
                    in_response = false;
                }
                current_element = None;
            }
            Ok(Event::Text(e)) => {
                if let Some(ref elem) = current_element {
                    let text = e.unescape().unwrap_or_default().to_string();
                    match elem.as_str() {
                        "href" => current_href = Some(text),
                        "displayname" => current_displayname = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    calendars
}

/// Parses a REPORT multistatus response into `(href, ics_data)` pairs.
pub fn parse_report_response(xml: &str) -> Vec<(String, String)> {
    let mut results = Vec::new();

    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut current_href: Option<String> = None;
    let mut current_data: Option<String> = None;
    let mut in_response = false;
    let mut current_element: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match local_name(&name) {
                    "response" => {
                        in_response = true;
                        current_href = None;
                        current_data = None;
                    }
                    "href" | "calendar-data" => {
                        current_element = Some(local_name(&name).to_string());
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if local_name(&name) == "response" && in_response {
                    if let (Some(href), Some(data)) = (current_href.take(), current_data.take()) {
                        results.push((href, data));
                    }
                    in_response = false;
                }
                current_element = None;
            }
            Ok(Event::Text(e)) => {
                if let Some(ref elem) = current_element {
                    let text = e.unescape().unwrap_or_default().to_string();
                    match elem.as_str() {
                        "href" => current_href = Some(text),
                        "calendar-data" => current_data = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(ref elem) = current_element {
                    let text = String::from_utf8_lossy(&e).to_string();
                    match elem.as_str() {
                        "href" => current_href = Some(text),
                        "calendar-data" => current_data = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    results
}

fn write_empty_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str) {
    writer
        .write_event(Event::Empty(BytesStart::new(name)))
        .unwrap();
}

/// Strips a namespace prefix from an element name.
fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Formats a datetime for CalDAV time-range filters.
fn format_caldav_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}
