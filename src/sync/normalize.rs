/// Text normalization used by SKU comparison, attribute term matching and
/// variation attribute keys. The source catalog carries South-Slavic
/// diacritics in slugs and option names; the target stores ASCII slugs.

/// Map diacritics to their ASCII transliteration, leaving other characters
/// untouched. Case is preserved.
pub fn transliterate(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            'š' => out.push('s'),
            'Š' => out.push('S'),
            'đ' => out.push_str("dj"),
            'Đ' => out.push_str("Dj"),
            'č' | 'ć' => out.push('c'),
            'Č' | 'Ć' => out.push('C'),
            'ž' => out.push('z'),
            'Ž' => out.push('Z'),
            'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => out.push('a'),
            'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => out.push('A'),
            'é' | 'è' | 'ê' | 'ë' => out.push('e'),
            'É' | 'È' | 'Ê' | 'Ë' => out.push('E'),
            'í' | 'ì' | 'î' | 'ï' => out.push('i'),
            'Í' | 'Ì' | 'Î' | 'Ï' => out.push('I'),
            'ó' | 'ò' | 'ô' | 'ö' | 'õ' => out.push('o'),
            'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => out.push('O'),
            'ú' | 'ù' | 'û' | 'ü' => out.push('u'),
            'Ú' | 'Ù' | 'Û' | 'Ü' => out.push('U'),
            'ñ' => out.push('n'),
            'Ñ' => out.push('N'),
            'ß' => out.push_str("ss"),
            other => out.push(other),
        }
    }
    out
}

/// Canonical form for SKU equality: trimmed, lowercased, transliterated,
/// with runs of whitespace and underscores collapsed to single dashes.
pub fn normalize_sku(sku: &str) -> String {
    let lowered = transliterate(sku.trim()).to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_sep = false;
    for ch in lowered.chars() {
        if ch.is_whitespace() || ch == '_' || ch == '-' {
            if !last_was_sep && !out.is_empty() {
                out.push('-');
            }
            last_was_sep = true;
        } else {
            out.push(ch);
            last_was_sep = false;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Canonical form for attribute term comparison: trimmed, lowercased,
/// transliterated, inner whitespace collapsed to single spaces.
pub fn normalize_term(value: &str) -> String {
    let lowered = transliterate(value.trim()).to_lowercase();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Slug form: normalized term with spaces turned into dashes and anything
/// outside `[a-z0-9-]` dropped.
pub fn slugify(value: &str) -> String {
    normalize_term(value)
        .chars()
        .map(|c| if c == ' ' { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}
