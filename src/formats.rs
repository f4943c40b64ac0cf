use std::path::Path;

/// Formats the converter can read, most requested first.
pub const INPUT_FORMATS: &[&str] = &[
    "markdown", "html", "docx", "gfm", "rst", "latex", "odt", "plain", "epub", "mediawiki", "org",
    "ipynb", "csv", "json", "rtf", "textile", "docbook", "jira", "opml", "fb2", "vimwiki", "twiki",
    "tikiwiki", "creole",
];

/// Formats the converter can write, most requested first.
pub const OUTPUT_FORMATS: &[&str] = &[
    "markdown", "html", "pdf", "docx", "gfm", "pptx", "rst", "latex", "odt", "plain", "epub",
    "mediawiki", "json", "org", "asciidoc", "rtf", "textile", "docbook", "jira", "ipynb", "opml",
    "fb2", "vimwiki",
];

/// Target formats that need a dedicated rendering engine.
pub const PDF_FORMAT: &str = "pdf";

pub fn is_input_format(format: &str) -> bool {
    INPUT_FORMATS.contains(&format)
}

pub fn is_output_format(format: &str) -> bool {
    OUTPUT_FORMATS.contains(&format)
}

/// File extension (with leading dot) used for files of `format`.
pub fn extension_for(format: &str) -> &'static str {
    match format {
        "markdown" | "gfm" => ".md",
        "html" => ".html",
        "pdf" => ".pdf",
        "docx" => ".docx",
        "odt" => ".odt",
        "rst" => ".rst",
        "latex" => ".tex",
        "plain" | "jira" | "twiki" | "tikiwiki" | "creole" => ".txt",
        "mediawiki" | "vimwiki" => ".wiki",
        "epub" => ".epub",
        "json" => ".json",
        "org" => ".org",
        "asciidoc" => ".adoc",
        "csv" => ".csv",
        "rtf" => ".rtf",
        "textile" => ".textile",
        "docbook" => ".xml",
        "ipynb" => ".ipynb",
        "opml" => ".opml",
        "fb2" => ".fb2",
        "pptx" => ".pptx",
        _ => "",
    }
}

/// Guesses a source format from an uploaded file name.
pub fn format_from_file_name(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    let format = match ext.as_str() {
        "md" | "markdown" => "markdown",
        "html" | "htm" => "html",
        "docx" => "docx",
        "odt" => "odt",
        "rst" => "rst",
        "tex" => "latex",
        "txt" => "plain",
        "wiki" => "mediawiki",
        "epub" => "epub",
        "json" => "json",
        "org" => "org",
        "adoc" => "asciidoc",
        "csv" => "csv",
        "rtf" => "rtf",
        "textile" => "textile",
        "ipynb" => "ipynb",
        "opml" => "opml",
        "fb2" => "fb2",
        "pptx" => "pptx",
        "pdf" => "pdf",
        _ => return None,
    };
    Some(format)
}

/// Content type served for a converted file, inferred from its extension.
pub fn content_type_for(path: &Path) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_().as_str() == "text" {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_string()
    }
}
