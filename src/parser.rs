use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{map, map_res, opt, rest, verify},
    number::complete::double,
    sequence::{delimited, preceded, tuple},
    IResult,
};
use serde_json::Value;

#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    List,
    Get { code: String },
    Near { lat: f64, lng: f64, radius_km: Option<f64> },
    Popular { limit: Option<usize> },
    Insert { body: Value },
    Update { code: String, body: Value },
    Delete { code: String },
    Help,
    Exit,
}

// --- BASIC PARSERS ---

fn parse_code(input: &str) -> IResult<&str, String> {
    let bare = take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    map(
        alt((delimited(char('\''), take_while1(|c: char| c != '\''), char('\'')), bare)),
        |s: &str| s.trim().to_string(),
    )(input)
}

fn parse_usize(input: &str) -> IResult<&str, usize> {
    map_res(digit1, |s: &str| s.parse::<usize>())(input)
}

// Everything left on the line, which must be a JSON object
fn parse_json_object(input: &str) -> IResult<&str, Value> {
    verify(
        map_res(rest, |s: &str| serde_json::from_str::<Value>(s.trim())),
        |v: &Value| v.is_object(),
    )(input)
}

// --- HELPERS ---
fn ws<'a, F, O, E: nom::error::ParseError<&'a str>>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where F: FnMut(&'a str) -> IResult<&'a str, O, E> {
    delimited(multispace0, inner, multispace0)
}

fn tag_ci(t: &'static str) -> impl FnMut(&str) -> IResult<&str, &str> {
    move |input| tag_no_case(t)(input)
}

// --- COMMAND PARSERS ---

fn parse_list(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("LIST")(input)?;
    Ok((input, Command::List))
}

fn parse_get(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("GET")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, code) = parse_code(input)?;
    Ok((input, Command::Get { code }))
}

fn parse_near(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("NEAR")(input)?;
    let (input, lat) = ws(double)(input)?;
    let (input, _) = opt(ws(char(',')))(input)?;
    let (input, lng) = ws(double)(input)?;
    let (input, radius_km) = opt(preceded(
        tuple((ws(tag_ci("RADIUS")), multispace0)),
        double,
    ))(input)?;
    let (input, _) = opt(ws(tag_ci("KM")))(input)?;
    Ok((input, Command::Near { lat, lng, radius_km }))
}

fn parse_popular(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("POPULAR")(input)?;
    let (input, limit) = opt(preceded(ws(tag_ci("LIMIT")), parse_usize))(input)?;
    Ok((input, Command::Popular { limit }))
}

fn parse_insert(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("INSERT")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, body) = parse_json_object(input)?;
    Ok((input, Command::Insert { body }))
}

fn parse_update(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("UPDATE")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, code) = parse_code(input)?;
    let (input, _) = ws(tag_ci("SET"))(input)?;
    let (input, body) = parse_json_object(input)?;
    Ok((input, Command::Update { code, body }))
}

fn parse_delete(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("DELETE")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, code) = parse_code(input)?;
    Ok((input, Command::Delete { code }))
}

fn parse_help(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("HELP")(input)?;
    Ok((input, Command::Help))
}

fn parse_exit(input: &str) -> IResult<&str, Command> {
    let (input, _) = alt((tag_ci("EXIT"), tag_ci("QUIT")))(input)?;
    Ok((input, Command::Exit))
}

pub fn parse_command(input: &str) -> Result<Command, String> {
    let input = input.trim();
    let result = alt((
        parse_list,
        parse_get,
        parse_near,
        parse_popular,
        parse_insert,
        parse_update,
        parse_delete,
        parse_help,
        parse_exit,
    ))(input);

    match result {
        Ok((remainder, cmd)) => {
            if !remainder.trim().is_empty() {
                return Err(format!("Unexpected tokens at end: '{}'", remainder));
            }
            Ok(cmd)
        },
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let context: String = e.input.chars().take(20).collect();
            let ellipsis = if e.input.chars().count() > 20 { "..." } else { "" };
            Err(format!("Invalid syntax near: '{}{}'", context, ellipsis))
        },
        Err(nom::Err::Incomplete(_)) => Err("Incomplete command.".to_string()),
    }
}
