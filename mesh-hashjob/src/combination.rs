/// Converts a brute-force index into its length-`length` string over
/// `charset`, MSD-first (spec.md §4.8 "Chunk index mapping"): digit `0` of
/// the result is the most significant, matching `i` written in base
/// `charset.len()`.
pub fn index_to_combination(index: u64, charset: &[char], length: usize) -> String {
    let base = charset.len() as u64;
    let mut digits = vec![0u64; length];
    let mut remaining = index;
    for slot in digits.iter_mut().rev() {
        *slot = remaining % base;
        remaining /= base;
    }
    digits.into_iter().map(|d| charset[d as usize]).collect()
}

/// A mutation rule applied to a dictionary word. The catalog is fixed and
/// ordered so that `mutation_count` and `apply_mutation` agree on indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationRule {
    Identity,
    Uppercase,
    Capitalize,
    Reverse,
    AppendDigit(u8),
}

fn catalog(names: &[String]) -> Vec<MutationRule> {
    let mut rules = vec![MutationRule::Identity];
    for name in names {
        match name.as_str() {
            "uppercase" => rules.push(MutationRule::Uppercase),
            "capitalize" => rules.push(MutationRule::Capitalize),
            "reverse" => rules.push(MutationRule::Reverse),
            "append_digits" => rules.extend((0..=9).map(MutationRule::AppendDigit)),
            _ => {}
        }
    }
    rules
}

/// `M`, the cartesian mutation count for a job's configured mutation names
/// (spec.md §4.8 "Dictionary: ... mutation at `i mod M`").
pub fn mutation_count(mutation_names: &[String]) -> usize {
    catalog(mutation_names).len()
}

fn apply_mutation(word: &str, rule: MutationRule) -> String {
    match rule {
        MutationRule::Identity => word.to_string(),
        MutationRule::Uppercase => word.to_uppercase(),
        MutationRule::Capitalize => {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        }
        MutationRule::Reverse => word.chars().rev().collect(),
        MutationRule::AppendDigit(d) => format!("{word}{d}"),
    }
}

/// Maps a dictionary-mode index to `(word, candidate)` via
/// `word = wordlist[floor(i / M)]`, `mutation = i mod M` (spec.md §4.8).
pub fn dictionary_candidate(index: u64, wordlist: &[String], mutation_names: &[String]) -> Option<String> {
    let rules = catalog(mutation_names);
    let m = rules.len() as u64;
    let word_index = (index / m) as usize;
    let mutation_index = (index % m) as usize;
    let word = wordlist.get(word_index)?;
    Some(apply_mutation(word, rules[mutation_index]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brute_force_index_is_msd_first() {
        let charset: Vec<char> = "abc".chars().collect();
        // base 3, length 3: index 10 = 1*9 + 0*3 + 1 = "bac".
        assert_eq!(index_to_combination(10, &charset, 3), "bac");
        assert_eq!(index_to_combination(0, &charset, 3), "aaa");
        assert_eq!(index_to_combination(26, &charset, 3), "ccc");
    }

    #[test]
    fn dictionary_mapping_uses_floor_and_modulo() {
        let wordlist = vec!["pass".to_string(), "word".to_string()];
        let mutations = vec!["uppercase".to_string()];
        // M = 2 (identity, uppercase).
        assert_eq!(mutation_count(&mutations), 2);
        assert_eq!(dictionary_candidate(0, &wordlist, &mutations).unwrap(), "pass");
        assert_eq!(dictionary_candidate(1, &wordlist, &mutations).unwrap(), "PASS");
        assert_eq!(dictionary_candidate(2, &wordlist, &mutations).unwrap(), "word");
        assert_eq!(dictionary_candidate(3, &wordlist, &mutations).unwrap(), "WORD");
        assert!(dictionary_candidate(4, &wordlist, &mutations).is_none());
    }
}
